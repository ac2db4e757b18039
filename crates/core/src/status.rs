//! Status values reported back to resource owners.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use serde::{Deserialize, Serialize};

use crate::resources::ParentReference;

pub const CONDITION_ACCEPTED: &str = "Accepted";
pub const CONDITION_PROGRAMMED: &str = "Programmed";
pub const CONDITION_RESOLVED_REFS: &str = "ResolvedRefs";

/// Build a condition stamped with the current time.
pub fn condition(
    type_: &str,
    status: bool,
    reason: &str,
    message: impl Into<String>,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        reason: reason.to_string(),
        message: message.into(),
        observed_generation,
        last_transition_time: Time(Utc::now()),
    }
}

/// Copy `last_transition_time` from `prev` onto every condition in `next`
/// whose type, status and reason did not change.
pub fn keep_transition_times(next: &mut [Condition], prev: &[Condition]) {
    for c in next {
        if let Some(p) = prev.iter().find(|p| p.type_ == c.type_ && p.status == c.status && p.reason == c.reason) {
            c.last_transition_time = p.last_transition_time.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub listeners: Vec<ListenerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    pub name: String,
    #[serde(default)]
    pub attached_routes: i32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default)]
    pub parents: Vec<RouteParentStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,
    pub controller_name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    #[serde(default)]
    pub ancestors: Vec<PolicyAncestorStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAncestorStatus {
    pub ancestor_ref: ParentReference,
    pub controller_name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Status record for any statically typed kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResourceStatus {
    Gateway(GatewayStatus),
    Route(RouteStatus),
    Policy(PolicyStatus),
    Backend(BackendStatus),
}

impl PolicyStatus {
    pub fn keep_transition_times(&mut self, prev: &PolicyStatus) {
        for a in &mut self.ancestors {
            if let Some(p) = prev.ancestors.iter().find(|p| p.ancestor_ref == a.ancestor_ref) {
                keep_transition_times(&mut a.conditions, &p.conditions);
            }
        }
    }
}

impl ResourceStatus {
    /// Carry unchanged conditions' transition times over from the stored
    /// record, so an unchanged opinion compares equal to it.
    pub fn keep_transition_times(&mut self, prev: &ResourceStatus) {
        match (self, prev) {
            (ResourceStatus::Gateway(s), ResourceStatus::Gateway(p)) => {
                keep_transition_times(&mut s.conditions, &p.conditions);
                for l in &mut s.listeners {
                    if let Some(pl) = p.listeners.iter().find(|pl| pl.name == l.name) {
                        keep_transition_times(&mut l.conditions, &pl.conditions);
                    }
                }
            }
            (ResourceStatus::Route(s), ResourceStatus::Route(p)) => {
                for parent in &mut s.parents {
                    if let Some(pp) = p.parents.iter().find(|pp| pp.parent_ref == parent.parent_ref) {
                        keep_transition_times(&mut parent.conditions, &pp.conditions);
                    }
                }
            }
            (ResourceStatus::Policy(s), ResourceStatus::Policy(p)) => s.keep_transition_times(p),
            (ResourceStatus::Backend(s), ResourceStatus::Backend(p)) => {
                keep_transition_times(&mut s.conditions, &p.conditions)
            }
            _ => {}
        }
    }

    /// Top-level conditions, flattened across parents/ancestors.
    pub fn conditions(&self) -> Vec<&Condition> {
        match self {
            ResourceStatus::Gateway(s) => s.conditions.iter().collect(),
            ResourceStatus::Route(s) => s.parents.iter().flat_map(|p| p.conditions.iter()).collect(),
            ResourceStatus::Policy(s) => s.ancestors.iter().flat_map(|a| a.conditions.iter()).collect(),
            ResourceStatus::Backend(s) => s.conditions.iter().collect(),
        }
    }

    /// Whether any condition of `type_` is `True`.
    pub fn is_true(&self, type_: &str) -> bool {
        self.conditions().iter().any(|c| c.type_ == type_ && c.status == "True")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_status_round_trips_through_json_shape() {
        let st = PolicyStatus {
            ancestors: vec![PolicyAncestorStatus {
                ancestor_ref: ParentReference { name: "gw".into(), ..Default::default() },
                controller_name: "ctrl".into(),
                conditions: vec![condition(CONDITION_ACCEPTED, true, "Accepted", "ok", Some(2))],
            }],
        };
        let v = serde_json::to_value(&st).unwrap();
        assert!(v["ancestors"][0]["ancestorRef"]["name"].is_string());
        assert_eq!(v["ancestors"][0]["controllerName"], "ctrl");
    }

    fn at(mut c: Condition, secs: i64) -> Condition {
        c.last_transition_time = Time(chrono::DateTime::from_timestamp(secs, 0).unwrap());
        c
    }

    #[test]
    fn unchanged_conditions_keep_their_transition_time() {
        let prev = ResourceStatus::Backend(BackendStatus {
            conditions: vec![
                at(condition(CONDITION_ACCEPTED, true, "Accepted", "", None), 10),
                at(condition(CONDITION_RESOLVED_REFS, true, "ResolvedRefs", "", None), 10),
            ],
        });
        let mut next = ResourceStatus::Backend(BackendStatus {
            conditions: vec![
                at(condition(CONDITION_ACCEPTED, true, "Accepted", "", None), 20),
                at(condition(CONDITION_RESOLVED_REFS, false, "BackendNotFound", "", None), 20),
            ],
        });
        next.keep_transition_times(&prev);
        let times: Vec<i64> = next.conditions().iter().map(|c| c.last_transition_time.0.timestamp()).collect();
        assert_eq!(times, vec![10, 20]);
    }

    #[test]
    fn same_route_opinion_compares_equal_after_carrying_times() {
        let route = |secs| {
            ResourceStatus::Route(RouteStatus {
                parents: vec![RouteParentStatus {
                    parent_ref: ParentReference { name: "gw".into(), ..Default::default() },
                    controller_name: "ctrl".into(),
                    conditions: vec![at(condition(CONDITION_ACCEPTED, true, "Accepted", "", None), secs)],
                }],
            })
        };
        let prev = route(10);
        let mut next = route(20);
        assert_ne!(prev, next);
        next.keep_transition_times(&prev);
        assert_eq!(prev, next);
    }

    #[test]
    fn is_true_inspects_nested_conditions() {
        let st = ResourceStatus::Route(RouteStatus {
            parents: vec![RouteParentStatus {
                parent_ref: ParentReference { name: "gw".into(), ..Default::default() },
                controller_name: "ctrl".into(),
                conditions: vec![condition(CONDITION_ACCEPTED, false, "NoMatchingParent", "", None)],
            }],
        });
        assert!(!st.is_true(CONDITION_ACCEPTED));
    }
}
