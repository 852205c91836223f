//! The `scan` and `status` subcommands: catalog building and content
//! inspection.

use std::path::Path;

use crate::catalog::{Catalog, CatalogError, scan_directory};
use crate::config::Config;
use crate::content::{ContentFilter, ContentStatus, ContentStore};
use crate::model::{ContentType, PersonaId};
use crate::rotation::RotationEngine;

pub fn cmd_scan(
    config_path: Option<&Path>,
    path: Option<&Path>,
    rebuild: bool,
) -> anyhow::Result<u8> {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return Ok(1);
        }
    };
    let music_dir = path.unwrap_or(&config.music_dir);
    println!("scanning {}", music_dir.display());

    let result = match scan_directory(music_dir) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("scan failed: {}", e);
            return Ok(1);
        }
    };

    let mut catalog = if rebuild {
        Catalog::new()
    } else {
        match Catalog::load(&config.catalog_path()) {
            Ok(catalog) => catalog,
            Err(CatalogError::NotFound(_)) => Catalog::new(),
            Err(e) => {
                eprintln!("existing catalog is unreadable: {} (use --rebuild)", e);
                return Ok(1);
            }
        }
    };

    let mut added = 0;
    let accepted = result.accepted.len();
    for song in result.accepted {
        if !catalog.contains(&song.id) {
            added += 1;
        }
        catalog.add_song(song);
    }

    std::fs::create_dir_all(&config.content_root)?;
    catalog.save(&config.catalog_path())?;

    // New songs enter rotation as Discovery
    let mut rotation = RotationEngine::load(
        &config.rotation_path(),
        config.rotation.core_ratio,
        config.rotation.graduation_threshold,
    )?;
    rotation.sync_catalog(&catalog);
    rotation.save(&config.rotation_path())?;

    println!(
        "scanned {} files: {} new, {} updated, {} failed; catalog now holds {} songs",
        accepted + result.failed.len(),
        added,
        accepted - added,
        result.failed.len(),
        catalog.len(),
    );
    for (path, reason) in result.failed.iter().take(20) {
        eprintln!("  skipped {}: {}", path.display(), reason);
    }
    Ok(0)
}

pub fn cmd_status(config_path: Option<&Path>) -> anyhow::Result<u8> {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return Ok(1);
        }
    };

    match Catalog::load(&config.catalog_path()) {
        Ok(catalog) => println!("catalog: {} songs", catalog.len()),
        Err(e) => println!("catalog: unavailable ({})", e),
    }

    let store = ContentStore::new(&config.content_root);
    println!("content store at {}:", config.content_root.display());
    for content_type in ContentType::ALL {
        for persona in PersonaId::ALL {
            let filter = ContentFilter {
                content_type: Some(content_type),
                persona: Some(persona),
                status: None,
            };
            let keys = store.enumerate(&filter)?;
            if keys.is_empty() {
                continue;
            }
            let ready = keys
                .iter()
                .filter(|k| {
                    store
                        .read_item(k)
                        .map(|i| i.status == ContentStatus::AudioReady)
                        .unwrap_or(false)
                })
                .count();
            println!("  {:<12} {}  {:>4}/{} ready", content_type.to_string(), persona, ready, keys.len());
        }
    }
    Ok(0)
}
