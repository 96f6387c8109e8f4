use dotenv::dotenv;
use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use toml::Value;

struct AppMetadata {
    file: std::fs::File,
}

impl AppMetadata {
    pub fn new() -> io::Result<Self> {
        let out_dir = env::var("OUT_DIR").unwrap();
        let dest_path = Path::new(&out_dir).join("app_metadata.rs");
        let file = File::create(&dest_path)?;
        Ok(Self { file })
    }

    pub fn write(&mut self, key: &str, value: &str) -> io::Result<()> {
        write!(
            self.file,
            "#[allow(unused)]\npub const APP_METADATA_{}: &str = {:?};\n",
            &key.to_uppercase(),
            &value
        )
    }

    pub fn write_list(&mut self, key: &str, values: &[String]) -> io::Result<()> {
        write!(self.file, "#[allow(unused)]\npub const APP_METADATA_{}: &[&str] = &[", &key.to_uppercase())?;
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                write!(self.file, ", ")?;
            }
            write!(self.file, "{:?}", value)?;
        }
        writeln!(self.file, "];")
    }
}

fn main() -> io::Result<()> {
    // Load .env file if it exists
    let _ = dotenv();
    println!("cargo:rerun-if-env-changed=UPKIT_UPDATE_ENDPOINTS");

    let cargo_toml = fs::read_to_string("Cargo.toml").expect("Failed to read Cargo.toml");
    let cargo_toml: Value = toml::from_str(&cargo_toml).expect("Failed to parse Cargo.toml");

    let mut app_metadata = AppMetadata::new()?;
    app_metadata.write("NAME", &env::var("CARGO_PKG_NAME").unwrap())?;
    app_metadata.write("VERSION", &env::var("CARGO_PKG_VERSION").unwrap())?;

    let package = cargo_toml.get("package");
    let repository = package
        .and_then(|pkg| pkg.get("repository"))
        .and_then(|repo| repo.as_str())
        .unwrap_or_default();
    app_metadata.write("REPOSITORY", repository)?;

    if let Some(metadata) = package.and_then(|pkg| pkg.get("metadata")).and_then(|meta| meta.as_table()) {
        for (key, value) in metadata {
            if let Some(value) = value.as_str() {
                app_metadata.write(key, value)?;
            }
        }
    }

    // Metadata endpoints can be overridden per build, comma separated
    let endpoints = match env::var("UPKIT_UPDATE_ENDPOINTS") {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>(),
        Err(_) => vec!["https://mirrorchyan.com/api".to_string()],
    };
    app_metadata.write_list("ENDPOINTS", &endpoints)?;

    Ok(())
}
