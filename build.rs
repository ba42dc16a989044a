use std::env;
use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-env-changed=TIMELOOP_EMBED_LEVEL_PATH");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let out_path = Path::new(&out_dir).join("timeloop_embedded_level.json");

    let path = env::var("TIMELOOP_EMBED_LEVEL_PATH")
        .unwrap_or_else(|_| "levels/first_steps.json".to_string());
    println!("cargo:rerun-if-changed={path}");
    let content = fs::read_to_string(&path).unwrap_or_else(|_| "{}".to_string());

    fs::write(out_path, content).expect("failed to write embedded level");
}
