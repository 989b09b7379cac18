//! Table rendering for cluster node listings.

use k8s_openapi::api::core::v1::Node;
use kube::api::ObjectList;

/// Extension trait rendering an `ObjectList<Node>` as a table.
pub trait NodeListExt {
    fn render_table(&self) -> String;
}

impl NodeListExt for ObjectList<Node> {
    fn render_table(&self) -> String {
        let rows = self.items.iter().map(node_column).collect::<Vec<_>>();
        comfy_table::Table::new()
            .load_preset(comfy_table::presets::NOTHING)
            .set_content_arrangement(comfy_table::ContentArrangement::Dynamic)
            .set_header(vec!["NAME", "STATUS", "INTERNAL-IP", "OS-IMAGE"])
            .add_rows(rows)
            .to_string()
    }
}

fn node_column(node: &Node) -> Vec<String> {
    vec![
        node.metadata.name.clone().unwrap_or_default(),
        node_status(node),
        internal_ip(node).unwrap_or_else(|| "<none>".to_string()),
        os_image(node).unwrap_or_default(),
    ]
}

/// `Ready` when the Ready condition is true, `NotReady` otherwise.
fn node_status(node: &Node) -> String {
    let ready = node
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|condition| condition.type_ == "Ready" && condition.status == "True");
    if ready { "Ready".to_string() } else { "NotReady".to_string() }
}

fn internal_ip(node: &Node) -> Option<String> {
    node.status
        .as_ref()
        .and_then(|status| status.addresses.as_ref())
        .into_iter()
        .flatten()
        .find(|address| address.type_ == "InternalIP")
        .map(|address| address.address.clone())
}

fn os_image(node: &Node) -> Option<String> {
    node.status.as_ref().and_then(|status| status.node_info.as_ref()).map(|info| info.os_image.clone())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeCondition, NodeStatus};

    use super::{internal_ip, node_status};

    fn node(ready: &str) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    ..NodeCondition::default()
                }]),
                addresses: Some(vec![
                    NodeAddress {
                        type_: "InternalIP".to_string(),
                        address: "10.0.0.7".to_string(),
                    },
                    NodeAddress {
                        type_: "Hostname".to_string(),
                        address: "worker-1".to_string(),
                    },
                ]),
                ..NodeStatus::default()
            }),
            ..Node::default()
        }
    }

    #[test]
    fn test_node_status() {
        assert_eq!(node_status(&node("True")), "Ready");
        assert_eq!(node_status(&node("False")), "NotReady");
        assert_eq!(node_status(&Node::default()), "NotReady");
    }

    #[test]
    fn test_internal_ip_picks_the_internal_address() {
        assert_eq!(internal_ip(&node("True")).as_deref(), Some("10.0.0.7"));
        assert!(internal_ip(&Node::default()).is_none());
    }
}
