use super::expand::BomNode;

/// Pre-order serialization of an expanded tree. Each parent is immediately
/// followed by all of its descendants and no emitted node carries children,
/// so flattening an already flat list returns it unchanged.
pub fn flatten(tree: Vec<BomNode>) -> Vec<BomNode> {
    let mut flat = Vec::with_capacity(tree.iter().map(BomNode::subtree_size).sum());
    let mut stack: Vec<BomNode> = tree.into_iter().rev().collect();

    while let Some(mut node) = stack.pop() {
        if let Some(children) = node.children.take() {
            stack.extend(children.into_iter().rev());
        }
        flat.push(node);
    }

    flat
}

/// Outline (grouping) depth used by tabular export; direct lines sit at 0.
pub fn outline_level(node: &BomNode) -> u8 {
    u8::try_from((node.level - 1).max(0)).unwrap_or(u8::MAX)
}
