use crate::dom::Element;

/// Pre-order walk of `root`'s element subtree. Descendants carrying `marker`
/// start another component and are neither visited nor descended into.
pub fn walk(root: &Element, marker: &str, mut visit: impl FnMut(&Element)) {
    walk_with(root, marker, &mut |el| {
        visit(el);
        true
    });
}

/// Like [`walk`], but `visit` decides whether the walk enters the element's
/// children.
///
/// Children are snapshotted before they are visited. Nodes a visitor inserts
/// are not walked, and nodes it detaches are skipped.
pub fn walk_with(root: &Element, marker: &str, visit: &mut dyn FnMut(&Element) -> bool) {
    if !visit(root) {
        return;
    }
    descend(root, marker, visit);
}

fn descend(el: &Element, marker: &str, visit: &mut dyn FnMut(&Element) -> bool) {
    for child in el.children() {
        if !child.parent().is_some_and(|p| p.ptr_eq(el)) {
            continue;
        }
        if child.has_attribute(marker) {
            continue;
        }
        if visit(&child) {
            descend(&child, marker, visit);
        }
    }
}
