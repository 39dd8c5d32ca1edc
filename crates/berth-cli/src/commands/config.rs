use std::path::Path;

use berth_core::BerthConfig;

pub fn check(path: &Path) -> anyhow::Result<()> {
    let config = BerthConfig::from_file(path)?;
    println!("✓ {} is valid", path.display());
    println!();
    print!("{}", config.to_toml_string()?);
    Ok(())
}
