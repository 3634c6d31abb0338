//! Build script for rget-core.
//!
//! Captures the git revision the binary was built from so `rget version`
//! can report it next to the crate version.

fn main() {
    let revision = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo::rustc-env=RGET_BUILD_REVISION={}", revision);
    println!("cargo::rerun-if-changed=build.rs");
}
