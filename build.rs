use std::process::Command;

fn main() {
    // Container builds have no .git, they pass the hash in instead
    println!("cargo:rerun-if-env-changed=GETSTATS_GIT_HASH");
    let git_hash = std::env::var("GETSTATS_GIT_HASH")
        .ok()
        .filter(|hash| !hash.is_empty())
        .or_else(short_git_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}

fn short_git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}
