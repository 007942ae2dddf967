use std::env;
use std::path::PathBuf;

const ASM_DIR: &str = "src/asm";

fn main() {
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();
    let asm_file = match arch.as_str() {
        "x86_64" => "x86_64/swap.S",
        "aarch64" => "aarch64/swap.S",
        other => panic!(
            "shared-stack-coroutine has no hand-written context switch for target_arch \"{}\"; \
             supported architectures are x86_64 and aarch64",
            other
        ),
    };

    let path: PathBuf = [ASM_DIR, asm_file].iter().collect();
    println!("cargo:rerun-if-changed={}", path.display());

    cc::Build::new().file(&path).compile("ctxswtch");
}
