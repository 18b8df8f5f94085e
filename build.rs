use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Default)]
struct ConfigSection {
    chunk_alignment: Option<usize>,
    object_alignment: Option<usize>,
    default_floor_level: Option<u32>,
    over_allocated_numerator: Option<u64>,
    over_allocated_denominator: Option<u64>,
}

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    config: ConfigSection,
}

struct ResolvedConfig {
    chunk_alignment: usize,
    chunk_shift: u32,
    object_alignment: usize,
    default_floor_level: u32,
    over_allocated_numerator: u64,
    over_allocated_denominator: u64,
}

fn resolve_config(cfg: &ConfigSection) -> ResolvedConfig {
    let chunk_alignment = cfg.chunk_alignment.unwrap_or(512 * 1024);
    assert!(
        chunk_alignment > 0 && chunk_alignment.is_power_of_two(),
        "chunk_alignment ({chunk_alignment}) must be a power of 2"
    );

    let object_alignment = cfg.object_alignment.unwrap_or(8);
    assert!(
        object_alignment > 0 && object_alignment.is_power_of_two(),
        "object_alignment ({object_alignment}) must be a power of 2"
    );
    assert!(
        chunk_alignment % object_alignment == 0,
        "chunk_alignment ({chunk_alignment}) must be a multiple of object_alignment ({object_alignment})"
    );

    let default_floor_level = cfg.default_floor_level.unwrap_or(0);

    let over_allocated_numerator = cfg.over_allocated_numerator.unwrap_or(1);
    let over_allocated_denominator = cfg.over_allocated_denominator.unwrap_or(2);
    assert!(
        over_allocated_denominator > 0,
        "over_allocated_denominator must be > 0"
    );
    assert!(
        over_allocated_numerator <= over_allocated_denominator,
        "over_allocated_numerator ({over_allocated_numerator}) must be <= over_allocated_denominator ({over_allocated_denominator})"
    );

    ResolvedConfig {
        chunk_alignment,
        chunk_shift: chunk_alignment.trailing_zeros(),
        object_alignment,
        default_floor_level,
        over_allocated_numerator,
        over_allocated_denominator,
    }
}

fn generate_config(cfg: &ResolvedConfig, out_path: &Path) {
    let code = format!(
        "// Auto-generated by build.rs. Do not edit.\n\n\
         pub const CHUNK_ALIGNMENT: usize = {};\n\
         pub const CHUNK_SHIFT: u32 = {};\n\
         pub const OBJECT_ALIGNMENT: usize = {};\n\
         pub const DEFAULT_FLOOR_LEVEL: u32 = {};\n\
         pub const OVER_ALLOCATED_NUMERATOR: u64 = {};\n\
         pub const OVER_ALLOCATED_DENOMINATOR: u64 = {};\n",
        cfg.chunk_alignment,
        cfg.chunk_shift,
        cfg.object_alignment,
        cfg.default_floor_level,
        cfg.over_allocated_numerator,
        cfg.over_allocated_denominator,
    );
    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{manifest_dir}/hhgc.toml")
}

fn main() {
    println!("cargo:rerun-if-env-changed=HHGC_CONFIG");

    let out_dir = env::var("OUT_DIR").unwrap();

    let config_path = env::var("HHGC_CONFIG").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={config_path}");
    let content = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("failed to read {config_path}: {e}"));

    let config: Config = toml::from_str(&content).expect("failed to parse TOML config");
    let resolved = resolve_config(&config.config);

    generate_config(&resolved, &Path::new(&out_dir).join("config_gen.rs"));
}
