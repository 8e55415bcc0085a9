//! Scaffold a new pair of migration scripts, numbered and stamped with a
//! timestamped comment, in the flat `{version}_{name}.{up,down}.sql` naming
//! convention `source::file::FileSource` scans for.

use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};

use anyhow::{Context, Result};
use chrono::Local;

pub fn create(migration_dir: &Path, migration_name: &str) -> Result<()> {
    if !migration_dir.exists() {
        fs::create_dir_all(migration_dir).context("Failed to create migration directory.")?;
    }

    // Determine the next version by scanning existing `{version}_{name}`
    // file stems in the directory.
    let max_version = fs::read_dir(migration_dir)
        .context("Failed to read migration directory")?
        .filter_map(|res| res.map(|e| e.path()).ok())
        .filter_map(|entry| {
            let file_name = entry.file_name()?.to_str()?.to_string();
            let (version_part, _rest) = file_name.split_once('_')?;
            version_part.parse::<i64>().ok()
        })
        .max()
        .unwrap_or(0);

    let new_version = max_version + 1;
    let slug = migration_name
        .replace(['-', ' '], "_")
        .trim_end_matches('_')
        .to_string();
    let stem = format!("{new_version}_{slug}");

    let current_date = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let comment = |up_or_down: &str| {
        format!("-- {up_or_down} migration `{stem}` generated at {current_date}.\n")
    };

    let up_path = migration_dir.join(format!("{stem}.up.sql"));
    let down_path = migration_dir.join(format!("{stem}.down.sql"));

    File::create(&up_path)
        .and_then(|mut file| file.write_all(comment("Up").as_bytes()))
        .context("Failed to create and write up migration script")?;

    File::create(&down_path)
        .and_then(|mut file| file.write_all(comment("Down").as_bytes()))
        .context("Failed to create and write down migration script")?;

    println!("created {}", up_path.display());
    println!("created {}", down_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_flat_numbered_pair() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), "add users").unwrap();
        assert!(dir.path().join("1_add_users.up.sql").exists());
        assert!(dir.path().join("1_add_users.down.sql").exists());
    }

    #[test]
    fn numbers_increment_from_existing_scripts() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), "first").unwrap();
        create(dir.path(), "second").unwrap();
        assert!(dir.path().join("2_second.up.sql").exists());
    }
}
