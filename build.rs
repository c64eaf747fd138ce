use std::env;

fn main() {
    // `x11_selection` marks targets whose clipboard is an X server selection.
    // It mirrors the cfg that pulls in `xcb` in Cargo.toml so the sources
    // can use one short name instead of repeating the target expression.
    println!("cargo::rustc-check-cfg=cfg(x11_selection)");

    let family = env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let unix = family.split(',').any(|f| f == "unix");
    if unix && os != "macos" {
        println!("cargo::rustc-cfg=x11_selection");
    }
}
