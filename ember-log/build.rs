use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

fn emit_release_var() {
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_default();

    let revision = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_owned());

    match revision {
        Some(revision) if !revision.is_empty() => {
            println!("cargo:rustc-env=EMBER_RELEASE=ember@{version}+{revision}")
        }
        _ => println!("cargo:rustc-env=EMBER_RELEASE=ember@{version}"),
    }
}

fn list_crates() -> Vec<String> {
    let mut crates = Vec::new();

    let Ok(entries) = fs::read_dir("../") else {
        return crates;
    };

    for entry in entries.flatten() {
        if !entry.file_type().is_ok_and(|ty| ty.is_dir()) {
            continue;
        }

        if let Some(s) = entry.file_name().to_str() {
            if s.starts_with("ember") {
                crates.push(s.replace('-', "_"));
            }
        }
    }

    crates.sort();
    crates
}

fn emit_crate_list() -> Result<(), io::Error> {
    let crates = list_crates();

    let out_dir = env::var("OUT_DIR").map_err(io::Error::other)?;
    let dest_path = Path::new(&out_dir).join("constants.gen.rs");
    let mut f = File::create(dest_path)?;

    write!(f, "const CRATE_NAMES: &[&str] = &[")?;
    for name in &crates {
        write!(f, "\"{name}\",")?;
    }
    writeln!(f, "];")?;

    Ok(())
}

fn main() {
    emit_release_var();
    emit_crate_list().unwrap();
    println!("cargo:rerun-if-changed=build.rs");
}
