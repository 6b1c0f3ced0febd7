//! Simple in-memory filesystem.
//!
//! This implementation has state, so if you create a
//! new instance in a handler(), it will be empty every time.
//!
//! This means you have to create the instance once, using `MemFs::new`, store
//! it in your handler struct, and clone() it every time you pass
//! it to the DavHandler. As a MemFs struct is just a handle, cloning is cheap.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::{future, stream, FutureExt};
use parking_lot::Mutex;

use crate::davpath::DavPath;
use crate::fs::*;

/// Ephemeral in-memory filesystem.
#[derive(Debug, Clone)]
pub struct MemFs {
    tree: Arc<Mutex<BTreeMap<Vec<u8>, MemNode>>>,
}

#[derive(Debug, Clone)]
enum MemNode {
    Dir(MemMeta),
    File(MemMeta, Vec<u8>),
}

#[derive(Debug, Clone)]
struct MemMeta {
    created: SystemTime,
    modified: SystemTime,
}

#[derive(Debug, Clone)]
struct MemFsMetaData {
    meta: MemMeta,
    len: u64,
    is_dir: bool,
}

#[derive(Debug)]
struct MemFsFile {
    tree: Arc<Mutex<BTreeMap<Vec<u8>, MemNode>>>,
    key: Vec<u8>,
    pos: usize,
}

struct MemFsDirEntry {
    name: Vec<u8>,
    meta: MemFsMetaData,
}

// paths are stored without trailing slash, except for the root.
fn node_key(path: &DavPath) -> Vec<u8> {
    let b = path.as_bytes();
    if b.len() > 1 && b.ends_with(b"/") {
        b[..b.len() - 1].to_vec()
    } else {
        b.to_vec()
    }
}

fn parent_key(key: &[u8]) -> Vec<u8> {
    match key.iter().rposition(|&c| c == b'/') {
        Some(0) | None => b"/".to_vec(),
        Some(pos) => key[..pos].to_vec(),
    }
}

impl MemMeta {
    fn now() -> MemMeta {
        let now = SystemTime::now();
        MemMeta {
            created: now,
            modified: now,
        }
    }
}

impl MemNode {
    fn metadata(&self) -> MemFsMetaData {
        match self {
            MemNode::Dir(m) => MemFsMetaData {
                meta: m.clone(),
                len: 0,
                is_dir: true,
            },
            MemNode::File(m, data) => MemFsMetaData {
                meta: m.clone(),
                len: data.len() as u64,
                is_dir: false,
            },
        }
    }
}

impl MemFs {
    /// Create a new "memfs" filesystem, containing only the root collection.
    pub fn new() -> Arc<MemFs> {
        let mut tree = BTreeMap::new();
        tree.insert(b"/".to_vec(), MemNode::Dir(MemMeta::now()));
        Arc::new(MemFs {
            tree: Arc::new(Mutex::new(tree)),
        })
    }

    fn is_dir(tree: &BTreeMap<Vec<u8>, MemNode>, key: &[u8]) -> bool {
        matches!(tree.get(key), Some(MemNode::Dir(_)))
    }
}

impl DavFileSystem for MemFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        let tree = self.tree.lock();
        let res = match tree.get(&node_key(path)) {
            Some(node) => Ok(Box::new(node.metadata()) as Box<dyn DavMetaData>),
            None => Err(FsError::NotFound),
        };
        future::ready(res).boxed()
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        let tree = self.tree.lock();
        let key = node_key(path);
        if !MemFs::is_dir(&tree, &key) {
            return future::ready(Err(FsError::NotFound)).boxed();
        }
        let mut entries = Vec::new();
        for (k, node) in tree.iter() {
            if k.as_slice() == b"/" || parent_key(k) != key {
                continue;
            }
            let name = k[k.iter().rposition(|&c| c == b'/').unwrap_or(0) + 1..].to_vec();
            entries.push(Box::new(MemFsDirEntry {
                name,
                meta: node.metadata(),
            }) as Box<dyn DavDirEntry>);
        }
        let strm: FsStream<Box<dyn DavDirEntry>> = Box::pin(stream::iter(entries));
        future::ready(Ok(strm)).boxed()
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        let mut tree = self.tree.lock();
        let key = node_key(path);
        let res = match tree.get_mut(&key) {
            Some(MemNode::Dir(_)) => Err(FsError::Forbidden),
            Some(MemNode::File(meta, data)) => {
                if options.truncate && options.write {
                    data.clear();
                    meta.modified = SystemTime::now();
                }
                Ok(())
            }
            None if options.create => {
                if MemFs::is_dir(&tree, &parent_key(&key)) {
                    tree.insert(key.clone(), MemNode::File(MemMeta::now(), Vec::new()));
                    Ok(())
                } else {
                    Err(FsError::Conflict)
                }
            }
            None => Err(FsError::NotFound),
        };
        let res = res.map(|_| {
            Box::new(MemFsFile {
                tree: self.tree.clone(),
                key,
                pos: 0,
            }) as Box<dyn DavFile>
        });
        future::ready(res).boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        let mut tree = self.tree.lock();
        let key = node_key(path);
        let res = if tree.contains_key(&key) {
            Err(FsError::Exists)
        } else if !MemFs::is_dir(&tree, &parent_key(&key)) {
            Err(FsError::Conflict)
        } else {
            tree.insert(key, MemNode::Dir(MemMeta::now()));
            Ok(())
        };
        future::ready(res).boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        let mut tree = self.tree.lock();
        let key = node_key(path);
        let res = if !MemFs::is_dir(&tree, &key) {
            Err(FsError::NotFound)
        } else if key.as_slice() == b"/" {
            Err(FsError::Forbidden)
        } else if tree.keys().any(|k| k.as_slice() != b"/" && parent_key(k) == key) {
            Err(FsError::Forbidden)
        } else {
            tree.remove(&key);
            Ok(())
        };
        future::ready(res).boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        let mut tree = self.tree.lock();
        let key = node_key(path);
        let res = match tree.get(&key) {
            Some(MemNode::File(..)) => {
                tree.remove(&key);
                Ok(())
            }
            Some(MemNode::Dir(_)) => Err(FsError::Forbidden),
            None => Err(FsError::NotFound),
        };
        future::ready(res).boxed()
    }
}

impl DavFile for MemFsFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let tree = self.tree.lock();
        let res = match tree.get(&self.key) {
            Some(node) => Ok(Box::new(node.metadata()) as Box<dyn DavMetaData>),
            None => Err(FsError::NotFound),
        };
        future::ready(res).boxed()
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        let mut tree = self.tree.lock();
        let res = match tree.get_mut(&self.key) {
            Some(MemNode::File(meta, data)) => {
                data.extend_from_slice(&buf);
                meta.modified = SystemTime::now();
                Ok(())
            }
            _ => Err(FsError::NotFound),
        };
        future::ready(res).boxed()
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        let tree = self.tree.lock();
        let res = match tree.get(&self.key) {
            Some(MemNode::File(_, data)) => {
                let start = self.pos.min(data.len());
                let end = (start + count).min(data.len());
                self.pos = end;
                Ok(Bytes::copy_from_slice(&data[start..end]))
            }
            _ => Err(FsError::NotFound),
        };
        future::ready(res).boxed()
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        future::ready(Ok(())).boxed()
    }
}

impl DavDirEntry for MemFsDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.clone()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = self.meta.clone();
        future::ready(Ok(Box::new(meta) as Box<dyn DavMetaData>)).boxed()
    }
}

impl DavMetaData for MemFsMetaData {
    fn len(&self) -> u64 {
        self.len
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.meta.modified)
    }

    fn created(&self) -> FsResult<SystemTime> {
        Ok(self.meta.created)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}
