//! AZ-004: Fan-out binder, one child node per list element.
//!
//! Identifiers come from each element's declared name, never from its
//! position, so reordering a list only changes emission order.

use super::error::{ComposeError, ComposeResult};
use super::tree::{validate_segment, ConstructTree};
use super::types::NodeId;
use rustc_hash::FxHashSet;
use tracing::debug;

/// Expand `elements` into children of `owner`.
///
/// `element_id` names each element; `child_factory` creates the node for it
/// under `owner` using that identifier. Every identifier is checked before
/// any child is created: a repeated name, a name already taken under
/// `owner`, or an invalid name fails and leaves the tree unchanged.
pub fn bind_fan_out<E, I, F>(
    tree: &mut ConstructTree,
    owner: NodeId,
    elements: &[E],
    element_id: I,
    mut child_factory: F,
) -> ComposeResult<Vec<NodeId>>
where
    I: Fn(&E) -> String,
    F: FnMut(&mut ConstructTree, NodeId, &str, &E) -> ComposeResult<NodeId>,
{
    let owner_path = tree.path(owner).clone();
    let ids: Vec<String> = elements.iter().map(&element_id).collect();

    let mut seen = FxHashSet::default();
    for id in &ids {
        validate_segment(&owner_path.to_string(), id)?;
        if !seen.insert(id.as_str()) || tree.find(&owner_path.child(id)).is_some() {
            return Err(ComposeError::DuplicateIdentifier {
                parent: owner_path.to_string(),
                segment: id.clone(),
            });
        }
    }

    debug!("fan-out {} element(s) under {}", elements.len(), owner_path);
    let mut handles = Vec::with_capacity(elements.len());
    for (id, element) in ids.iter().zip(elements) {
        handles.push(child_factory(tree, owner, id, element)?);
    }
    Ok(handles)
}
