//! Listing page translation
//!
//! Turns one raw listing page into filesystem nodes: files for object
//! entries, then directories for common prefixes, both in backend order.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::adapter::FilesystemAdapter;
use crate::client::ListPage;
use crate::node::{Directory, File, Node};

/// Nodes for one page of a listing of `prefix`
pub fn translate_page(
    page: ListPage,
    prefix: &str,
    delimiter: char,
    adapter: &Arc<dyn FilesystemAdapter>,
) -> impl Iterator<Item = Node> {
    let prefix = prefix.to_string();
    let file_adapter = Arc::clone(adapter);
    let dir_adapter = Arc::clone(adapter);

    let files = page
        .contents
        .unwrap_or_default()
        .into_iter()
        .filter(move |entry| {
            if !entry.key.is_empty() && !entry.key.ends_with(delimiter) {
                return true;
            }
            if entry.key == prefix {
                trace!("Skipping placeholder object {:?}", entry.key);
            } else {
                warn!("Skipping object {:?} with a directory key", entry.key);
            }
            false
        })
        .map(move |entry| Node::File(File::new(entry.key, file_adapter.clone())));

    let dirs = page
        .common_prefixes
        .unwrap_or_default()
        .into_iter()
        .map(move |common_prefix| Node::Directory(Directory::new(common_prefix, dir_adapter.clone())));

    files.chain(dirs)
}
