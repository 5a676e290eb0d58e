//! Cluster roles a node can hold.
//!
//! A [`Role`] is a set of primitive roles packed into a bitmask. Each
//! primitive maps to a private extended-key-usage OID under the cluster
//! arc, which is how a role travels inside an issued certificate.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// OID arc that all role usages live under: `1.3.6.1.4.1.343.8`.
pub const ROLE_OID_ARC: [u64; 8] = [1, 3, 6, 1, 4, 1, 343, 8];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Role(u32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role: {0:?}")]
pub struct InvalidRoleError(pub String);

struct Primitive {
    role: Role,
    token: &'static str,
    oid_leaf: u64,
}

/// Canonical order: parsing, display, file labels and OIDs all walk this.
const PRIMITIVES: [Primitive; 5] = [
    Primitive {
        role: Role::AGENT,
        token: "agent",
        oid_leaf: 1,
    },
    Primitive {
        role: Role::NETAGENT,
        token: "netagent",
        oid_leaf: 4,
    },
    Primitive {
        role: Role::CONTROLLER,
        token: "controller",
        oid_leaf: 3,
    },
    Primitive {
        role: Role::SCHEDULER,
        token: "scheduler",
        oid_leaf: 2,
    },
    Primitive {
        role: Role::CNCIAGENT,
        token: "cnciagent",
        oid_leaf: 6,
    },
];

impl Role {
    pub const UNKNOWN: Role = Role(0);
    pub const CONTROLLER: Role = Role(0x2);
    pub const AGENT: Role = Role(0x4);
    pub const SCHEDULER: Role = Role(0x8);
    pub const NETAGENT: Role = Role(0x10);
    pub const CNCIAGENT: Role = Role(0x20);

    /// Compute node that also runs the network agent.
    pub const DUAL: Role = Role(Self::AGENT.0 | Self::NETAGENT.0);

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Subset test: every bit of `other` is set in `self`.
    pub const fn contains(self, other: Role) -> bool {
        self.0 & other.0 == other.0
    }

    /// Role named by the `{role}` segment of a signing request.
    ///
    /// Narrower than [`FromStr`]: only the four joinable roles are accepted,
    /// exact lowercase, no lists.
    pub fn from_enrollment_token(token: &str) -> Result<Role, InvalidRoleError> {
        match token {
            "agent" => Ok(Self::AGENT),
            "netagent" => Ok(Self::NETAGENT),
            "dual" => Ok(Self::DUAL),
            "controller" => Ok(Self::CONTROLLER),
            other => Err(InvalidRoleError(other.to_string())),
        }
    }

    /// Extended-key-usage OIDs for every primitive in this set.
    pub fn oids(self) -> Vec<Vec<u64>> {
        PRIMITIVES
            .iter()
            .filter(|p| self.contains(p.role))
            .map(|p| {
                let mut oid = ROLE_OID_ARC.to_vec();
                oid.push(p.oid_leaf);
                oid
            })
            .collect()
    }

    /// Reconstruct a role from the usage OIDs found in a certificate.
    /// OIDs outside the role arc are ignored.
    pub fn from_oids<I, O>(oids: I) -> Role
    where
        I: IntoIterator<Item = O>,
        O: AsRef<[u64]>,
    {
        let mut role = Role::UNKNOWN;
        for oid in oids {
            let oid = oid.as_ref();
            let Some(leaf) = oid.strip_prefix(&ROLE_OID_ARC[..]) else {
                continue;
            };
            if let [leaf] = leaf {
                if let Some(p) = PRIMITIVES.iter().find(|p| p.oid_leaf == *leaf) {
                    role |= p.role;
                }
            }
        }
        role
    }

    /// Label used in certificate file names: `agent+netagent`.
    pub fn file_label(self) -> String {
        if self.is_empty() {
            return "unknown".to_string();
        }
        self.tokens().collect::<Vec<_>>().join("+")
    }

    /// `cert-<label>-<host>.pem`.
    pub fn cert_file_name(self, host: &str) -> String {
        format!("cert-{}-{host}.pem", self.file_label())
    }

    fn tokens(self) -> impl Iterator<Item = &'static str> {
        PRIMITIVES
            .iter()
            .filter(move |p| self.contains(p.role))
            .map(|p| p.token)
    }
}

impl BitOr for Role {
    type Output = Role;

    fn bitor(self, rhs: Role) -> Role {
        Role(self.0 | rhs.0)
    }
}

impl BitOrAssign for Role {
    fn bitor_assign(&mut self, rhs: Role) {
        self.0 |= rhs.0;
    }
}

impl FromStr for Role {
    type Err = InvalidRoleError;

    /// Comma-separated primitive names, case-insensitive. `dual` expands to
    /// agent and netagent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut role = Role::UNKNOWN;
        for raw in s.split(',') {
            let token = raw.trim().to_ascii_lowercase();
            if token == "dual" {
                role |= Role::DUAL;
                continue;
            }
            let primitive = PRIMITIVES
                .iter()
                .find(|p| p.token == token)
                .ok_or_else(|| InvalidRoleError(raw.trim().to_string()))?;
            role |= primitive.role;
        }
        Ok(role)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("unknown");
        }
        for (i, token) in self.tokens().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(token)?;
        }
        Ok(())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_listed_roles() {
        assert_eq!("agent".parse::<Role>().unwrap(), Role::AGENT);
        assert_eq!(
            "agent,netagent".parse::<Role>().unwrap(),
            Role::AGENT | Role::NETAGENT
        );
        assert_eq!(
            " Controller , SCHEDULER ".parse::<Role>().unwrap(),
            Role::CONTROLLER | Role::SCHEDULER
        );
        assert_eq!("dual".parse::<Role>().unwrap(), Role::DUAL);
    }

    #[test]
    fn parse_rejects_unknown_and_empty_tokens() {
        assert!("".parse::<Role>().is_err());
        assert!("agent,".parse::<Role>().is_err());
        assert!("server".parse::<Role>().is_err());
        let err = "agent,bogus".parse::<Role>().unwrap_err();
        assert_eq!(err, InvalidRoleError("bogus".to_string()));
    }

    #[test]
    fn display_uses_canonical_order() {
        let role = Role::CNCIAGENT | Role::AGENT | Role::SCHEDULER;
        assert_eq!(role.to_string(), "agent,scheduler,cnciagent");
        assert_eq!(Role::UNKNOWN.to_string(), "unknown");
    }

    #[test]
    fn display_then_parse_is_identity() {
        let role = Role::NETAGENT | Role::CONTROLLER;
        assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
    }

    #[test]
    fn contains_is_a_subset_test() {
        let dual = Role::DUAL;
        assert!(dual.contains(Role::AGENT));
        assert!(dual.contains(Role::NETAGENT));
        assert!(dual.contains(Role::AGENT | Role::NETAGENT));
        assert!(!dual.contains(Role::CONTROLLER));
        assert!(!dual.contains(Role::AGENT | Role::CONTROLLER));
    }

    #[test]
    fn enrollment_tokens_are_strict() {
        assert_eq!(Role::from_enrollment_token("agent").unwrap(), Role::AGENT);
        assert_eq!(Role::from_enrollment_token("netagent").unwrap(), Role::NETAGENT);
        assert_eq!(Role::from_enrollment_token("dual").unwrap(), Role::DUAL);
        assert_eq!(
            Role::from_enrollment_token("controller").unwrap(),
            Role::CONTROLLER
        );
        assert!(Role::from_enrollment_token("scheduler").is_err());
        assert!(Role::from_enrollment_token("cnciagent").is_err());
        assert!(Role::from_enrollment_token("Agent").is_err());
        assert!(Role::from_enrollment_token("agent,netagent").is_err());
    }

    #[test]
    fn oids_live_under_cluster_arc() {
        let oids = Role::AGENT.oids();
        assert_eq!(oids, vec![vec![1, 3, 6, 1, 4, 1, 343, 8, 1]]);

        let oids = (Role::SCHEDULER | Role::CONTROLLER).oids();
        assert_eq!(
            oids,
            vec![
                vec![1, 3, 6, 1, 4, 1, 343, 8, 3],
                vec![1, 3, 6, 1, 4, 1, 343, 8, 2],
            ]
        );
    }

    #[test]
    fn from_oids_reverses_oids_and_ignores_foreign_usages() {
        let role = Role::DUAL | Role::CNCIAGENT;
        let mut oids = role.oids();
        oids.push(vec![1, 3, 6, 1, 5, 5, 7, 3, 1]);
        oids.push(vec![1, 3, 6, 1, 4, 1, 343, 8, 99]);
        oids.push(vec![1, 3, 6, 1, 4, 1, 343, 8, 1, 7]);
        assert_eq!(Role::from_oids(oids), role);
    }

    #[test]
    fn file_label_and_cert_name() {
        assert_eq!(Role::DUAL.file_label(), "agent+netagent");
        assert_eq!(
            Role::SCHEDULER.cert_file_name("node1"),
            "cert-scheduler-node1.pem"
        );
        assert_eq!(Role::UNKNOWN.file_label(), "unknown");
    }

    #[test]
    fn serializes_as_display_string() {
        let json = serde_json::to_string(&Role::DUAL).unwrap();
        assert_eq!(json, "\"agent,netagent\"");
    }
}
