use tokio_util::sync::CancellationToken;

use crate::storage::{DagService, PinMode, Pinner};
use crate::utils::Result;

const README: &str = "\
Hello and welcome to mini-ipfs!

This repo stores content by address. Add a file and you get back its content
address; anyone holding that address can fetch exactly the same bytes.

Names let you point at content that changes: publish a path under your
peer ID and resolve it again from any node that can reach yours.
";

const QUICK_START: &str = "\
mini-ipfs --repo <dir> init
mini-ipfs --repo <dir> add <file>
mini-ipfs --repo <dir> cat <path>
mini-ipfs --repo <dir> publish <path>
mini-ipfs --repo <dir> resolve <name>
mini-ipfs --repo <dir> daemon
";

const SECURITY_NOTES: &str = "\
Content added to a node is readable by anyone who knows its address.
Keep the repo directory, and any key files, private: they hold the keys
that sign your published names.
";

const ABOUT: &str = "\
mini-ipfs: a content-addressed block store with signed mutable names,
replicated over a small Kademlia DHT.
";

/// Adds the default documents as one directory, pins it recursively and
/// returns its root address.
pub async fn seed_init_docs(
    cancel: &CancellationToken,
    dag: &DagService,
    pinner: &mut Pinner,
) -> Result<String> {
    let docs = [
        ("about", ABOUT),
        ("quick-start", QUICK_START),
        ("readme", README),
        ("security-notes", SECURITY_NOTES),
    ];

    let mut entries = Vec::with_capacity(docs.len());
    for (name, body) in docs {
        let cid = dag.add(cancel, body.as_bytes()).await?;
        entries.push((name.to_string(), cid, body.len() as u64));
    }

    let root = dag.add_directory(entries).await?;
    pinner.pin(dag, &root, PinMode::Recursive).await?;
    pinner.flush().await?;
    Ok(root)
}
