use ra_connection::{Connection, RaResult};
use ra_types::{Extension, ExtensionKind, Guid};
use serde::{Deserialize, Serialize};

use crate::progress::TransferContext;

/// One descendant visited by [`expand_all`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub path: String,
    pub name: String,
    /// 1 for children of the start object.
    pub depth: usize,
    pub kind: ExtensionKind,
    /// Only set when the object already carries a GUID.
    pub guid: Option<Guid>,
}

/// Children of `path` in effective display order.
pub fn ordered_children(conn: &mut dyn Connection, path: &str) -> RaResult<Vec<Extension>> {
    let mut children = conn.get_extensions(path)?;
    let order = conn.get_ordering(path)?;
    children.sort_by_key(|child| {
        order
            .iter()
            .position(|name| *name == child.name)
            .unwrap_or(usize::MAX)
    });
    Ok(children)
}

/// Every descendant of `start`, depth-first in display order.
///
/// Hyperobjects and links are listed but not entered. The cancellation flag
/// is polled before each object is expanded.
pub fn expand_all(
    conn: &mut dyn Connection,
    start: &str,
    ctx: &TransferContext,
) -> RaResult<Vec<TreeNode>> {
    let mut nodes = Vec::new();
    let mut stack: Vec<(Extension, usize)> = ordered_children(conn, start)?
        .into_iter()
        .rev()
        .map(|child| (child, 1))
        .collect();

    while let Some((ext, depth)) = stack.pop() {
        ctx.check()?;
        ctx.report(&ext.path);
        let guid = match ext.kind {
            ExtensionKind::Object | ExtensionKind::Hyperobject => conn.read_uuid(&ext.path)?,
            ExtensionKind::Link | ExtensionKind::BrokenLink => None,
        };
        if ext.kind.is_traversable() {
            let children = ordered_children(conn, &ext.path)?;
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }
        nodes.push(TreeNode {
            path: ext.path,
            name: ext.name,
            depth,
            kind: ext.kind,
            guid,
        });
    }
    Ok(nodes)
}
