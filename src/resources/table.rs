//! Key-value tables: paintings, sessions, users.
//!
//! The three tables differ only in key schema. Capacity is fixed at the
//! provisioned minimum; there is no autoscaling policy.

use crate::core::naming::ResourceNames;
use crate::core::types::{ResourceKind, ResourceName};
use crate::resources::permissions::AccountScope;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Provisioned read/write capacity for every table.
pub const MIN_CAPACITY: u32 = 1;

/// Key attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum AttributeType {
    #[serde(rename = "S")]
    String,
    #[serde(rename = "N")]
    Number,
    #[serde(rename = "B")]
    Binary,
}

/// One key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeyAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl KeyAttribute {
    fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attribute_type: AttributeType::String,
        }
    }
}

/// Table descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableDescriptor {
    pub name: ResourceName,
    pub partition_key: KeyAttribute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<KeyAttribute>,
    pub read_capacity: u32,
    pub write_capacity: u32,
}

impl TableDescriptor {
    pub fn arn(&self, scope: &AccountScope) -> String {
        format!(
            "arn:aws:dynamodb:{}:{}:table/{}",
            scope.region, scope.account_id, self.name
        )
    }
}

/// Which of the three tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableRole {
    /// Paintings, keyed by owner and creation time
    Painting,
    Session,
    User,
}

impl TableRole {
    pub const ALL: [TableRole; 3] = [Self::Painting, Self::Session, Self::User];

    pub fn kind(self) -> ResourceKind {
        match self {
            Self::Painting => ResourceKind::PaintingTable,
            Self::Session => ResourceKind::SessionTable,
            Self::User => ResourceKind::UserTable,
        }
    }

    pub fn name(self, names: &ResourceNames) -> &ResourceName {
        match self {
            Self::Painting => &names.painting_table,
            Self::Session => &names.session_table,
            Self::User => &names.user_table,
        }
    }

    fn keys(self) -> (KeyAttribute, Option<KeyAttribute>) {
        match self {
            Self::Painting => (
                KeyAttribute::string("UserId"),
                Some(KeyAttribute::string("Timestamp")),
            ),
            Self::Session => (KeyAttribute::string("SessionId"), None),
            Self::User => (KeyAttribute::string("UserId"), None),
        }
    }
}

/// Describe one table.
pub fn build(role: TableRole, names: &ResourceNames) -> TableDescriptor {
    let (partition_key, sort_key) = role.keys();
    TableDescriptor {
        name: role.name(names).clone(),
        partition_key,
        sort_key,
        read_capacity: MIN_CAPACITY,
        write_capacity: MIN_CAPACITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EnvironmentToken;

    fn names() -> ResourceNames {
        ResourceNames::resolve("wcs", &EnvironmentToken::new("staging").unwrap()).unwrap()
    }

    #[test]
    fn test_painting_table_has_sort_key() {
        let t = build(TableRole::Painting, &names());
        assert_eq!(t.name, "wcs-table-staging");
        assert_eq!(t.partition_key.name, "UserId");
        assert_eq!(t.sort_key.as_ref().map(|k| k.name.as_str()), Some("Timestamp"));
        assert_eq!(t.read_capacity, 1);
        assert_eq!(t.write_capacity, 1);
    }

    #[test]
    fn test_session_and_user_tables() {
        let n = names();
        let s = build(TableRole::Session, &n);
        let u = build(TableRole::User, &n);
        assert_eq!(s.name, "wcs-session-table-staging");
        assert_eq!(s.partition_key.name, "SessionId");
        assert!(s.sort_key.is_none());
        assert_eq!(u.name, "wcs-user-table-staging");
        assert_eq!(u.partition_key.name, "UserId");
        assert!(u.sort_key.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let t = build(TableRole::Session, &names());
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["partition_key"]["type"], "S");
        assert!(json.get("sort_key").is_none());
    }

    #[test]
    fn test_arn() {
        let t = build(TableRole::User, &names());
        let scope = AccountScope {
            region: "ap-northeast-1".to_string(),
            account_id: "000000000000".to_string(),
        };
        assert_eq!(
            t.arn(&scope),
            "arn:aws:dynamodb:ap-northeast-1:000000000000:table/wcs-user-table-staging"
        );
    }

    #[test]
    fn test_role_kinds() {
        let kinds: Vec<_> = TableRole::ALL.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::PaintingTable,
                ResourceKind::SessionTable,
                ResourceKind::UserTable
            ]
        );
    }
}
