//! Grouping engine
//!
//! Partitions work items into groups sharing one required-field signature, so a single
//! form can drive a batch update across every item of a group.

use crate::types::{FieldGroup, FieldSignature, WorkItem};
use indexmap::IndexMap;

/// Group items by the signature of their first field entry
///
/// Single pass in input order, no sorting. Group ids follow the first-seen order of
/// distinct signatures. With a `target_node_id`, only items currently in progress at that
/// node become children; the others still reserve their signature's slot, so group ids
/// stay stable across target nodes.
#[must_use]
pub fn group_by_field_signature(items: &[WorkItem], target_node_id: Option<&str>) -> Vec<FieldGroup> {
    let mut groups: IndexMap<FieldSignature, Vec<WorkItem>> = IndexMap::new();

    for item in items {
        let joins = target_node_id.map_or(true, |node| item.is_at_node(node));
        let children = groups.entry(FieldSignature::of(item)).or_default();
        if joins {
            children.push(item.clone());
        }
    }

    let groups: Vec<FieldGroup> = groups
        .into_iter()
        .enumerate()
        .map(|(group_id, (signature, children))| FieldGroup {
            group_id,
            signature,
            children,
        })
        .collect();

    tracing::debug!(
        items = items.len(),
        groups = groups.len(),
        target = ?target_node_id,
        "grouped work items by field signature"
    );
    groups
}

/// Total number of submittable items across groups
#[inline]
#[must_use]
pub fn submittable_count(groups: &[FieldGroup]) -> usize {
    groups.iter().map(|g| g.children.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldEntry, NodeStatus, WorkflowNode};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn item(id: i64, key: &str, alias: &str) -> WorkItem {
        WorkItem::new(id, 1).with_fields(vec![FieldEntry::new(key, "text").with_alias(alias)])
    }

    fn ids(group: &FieldGroup) -> Vec<i64> {
        group.children.iter().map(|c| c.id).collect()
    }

    #[test]
    fn groups_by_first_seen_signature() {
        let items = vec![item(0, "a", "A"), item(1, "b", "B"), item(2, "a", "A")];

        let groups = group_by_field_signature(&items, None);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group_id, 0);
        assert_eq!(ids(&groups[0]), vec![0, 2]);
        assert_eq!(groups[1].group_id, 1);
        assert_eq!(ids(&groups[1]), vec![1]);
    }

    #[test]
    fn alias_is_part_of_the_signature() {
        let items = vec![item(0, "a", "A"), item(1, "a", "B")];
        assert_eq!(group_by_field_signature(&items, None).len(), 2);
    }

    #[test]
    fn target_node_filters_children_but_keeps_slots() {
        let at = |id, key: &str, node: &str, status| {
            item(id, key, "x").with_nodes(vec![WorkflowNode::new(node, status)])
        };
        let items = vec![
            at(0, "a", "review", NodeStatus::Done),
            at(1, "b", "review", NodeStatus::Doing),
            at(2, "a", "review", NodeStatus::Doing),
            at(3, "c", "deploy", NodeStatus::Doing),
        ];

        let groups = group_by_field_signature(&items, Some("review"));

        assert_eq!(groups.len(), 3);
        assert_eq!(ids(&groups[0]), vec![2]);
        assert_eq!(ids(&groups[1]), vec![1]);
        assert!(groups[2].is_empty());
        assert_eq!(submittable_count(&groups), 2);

        let unfiltered = group_by_field_signature(&items, None);
        let signatures: Vec<_> = unfiltered.iter().map(|g| g.signature.clone()).collect();
        let filtered: Vec<_> = groups.iter().map(|g| g.signature.clone()).collect();
        assert_eq!(signatures, filtered);
    }

    #[test]
    fn items_without_fields_or_workflow_do_not_panic() {
        let items = vec![WorkItem::new(0, 1), WorkItem::new(1, 1)];

        let groups = group_by_field_signature(&items, Some("review"));

        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_empty());
        assert_eq!(groups[0].signature, FieldSignature::default());
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_by_field_signature(&[], None).is_empty());
    }

    proptest! {
        #[test]
        fn unfiltered_grouping_partitions_items(keys in prop::collection::vec(0u8..5, 0..40)) {
            let items: Vec<_> = keys
                .iter()
                .enumerate()
                .map(|(i, k)| item(i as i64, &format!("k{k}"), "alias"))
                .collect();

            let groups = group_by_field_signature(&items, None);

            prop_assert_eq!(submittable_count(&groups), items.len());
            for (expected, group) in groups.iter().enumerate() {
                prop_assert_eq!(group.group_id, expected);
                let children = ids(group);
                let mut sorted = children.clone();
                sorted.sort_unstable();
                prop_assert_eq!(children, sorted);
            }
        }
    }
}
