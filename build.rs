fn main() {
    println!("cargo:rerun-if-env-changed=JSLS_VERSION");
    if let Ok(version) = std::env::var("JSLS_VERSION") {
        println!("cargo:rustc-env=CARGO_PKG_VERSION={version}");
    }
}
