use futures_util::{future::BoxFuture, FutureExt, StreamExt};
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::fs::*;
use crate::DavResult;

impl crate::DavHandler {
    // depth-first removal of a collection and everything below it.
    fn delete_tree(&self, path: DavPath) -> BoxFuture<'_, DavResult<()>> {
        async move {
            let mut children = Vec::new();
            let mut entries = self.fs.read_dir(&path).await?;
            while let Some(entry) = entries.next().await {
                let is_dir = entry.metadata().await.map(|m| m.is_dir()).unwrap_or(false);
                children.push((entry.name(), is_dir));
            }
            for (name, is_dir) in children {
                let mut p = path.clone();
                p.push_segment(&name);
                if is_dir {
                    p.add_slash();
                    self.delete_tree(p).await?;
                } else {
                    trace!("delete {}", p);
                    self.fs.remove_file(&p).await?;
                }
            }
            trace!("delete {}", path);
            self.fs.remove_dir(&path).await?;
            Ok(())
        }
        .boxed()
    }

    pub(crate) async fn handle_delete(&self, path: &DavPath) -> DavResult<Response<Body>> {
        let meta = self.fs.metadata(path).await?;
        if path.is_root() {
            return Err(FsError::Forbidden.into());
        }
        if meta.is_dir() {
            self.delete_tree(path.with_slash()).await?;
        } else {
            self.fs.remove_file(path).await?;
        }
        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::NO_CONTENT;
        Ok(res)
    }
}
