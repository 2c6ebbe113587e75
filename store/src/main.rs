// Forbid unwrap() in production code to prevent panics from corrupt data.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use std::process::ExitCode;

use store::config::StoreConfig;
use store::storage::paged::{PagedBTree, PagedTreeFile};
use store::storage::{RecordStore, StoreError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Loaded configuration: data_directory={}, page_degree={}, min_degree={}",
        config.data_directory.display(),
        config.page_degree,
        config.min_degree
    );

    if let Err(e) = std::fs::create_dir_all(&config.data_directory) {
        tracing::error!("Failed to create data directory: {e}");
        return ExitCode::FAILURE;
    }

    match rebuild(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Rebuild failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Rebuild both trees from the flat index, save the paged tree and dump
/// every page read back from disk.
fn rebuild(config: &StoreConfig) -> Result<(), StoreError> {
    let mut store = RecordStore::open(&config.data_directory)?;

    let live = store.scan()?.len();
    let btree = store.build_btree(config.min_degree)?;
    tracing::info!(
        live_records = live,
        entries = btree.len(),
        height = btree.height(),
        "in-memory btree ready"
    );

    let saved: PagedBTree = store.rebuild_paged_tree(config.page_degree)?;
    let mut file = PagedTreeFile::open(&store.tree_path())?;
    let header = *file.header();
    tracing::info!(
        degree = header.degree,
        pages = header.next_page,
        last_key = header.last_key,
        "paged tree written"
    );

    for (offset, page) in file.read_preorder()? {
        tracing::debug!("page at offset {offset}\n{page}");
    }

    let loaded = store.load_paged_tree()?;
    if loaded != saved {
        tracing::warn!(
            saved = saved.len(),
            loaded = loaded.len(),
            "paged tree read back differs from the one written"
        );
    }
    Ok(())
}
