use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global string interner shared by every scene identifier.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Monotonic counter shared by every generated id, so prefixes never collide
/// across id kinds.
static COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Declares an interned identifier type: 4 bytes, `Copy`, O(1) `Eq`/`Hash`,
/// serialized as its string form.
macro_rules! interned_id {
    ($(#[$meta:meta])* $name:ident, $sigil:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Spur);

        impl $name {
            /// Intern a string, or return the existing id if already interned.
            pub fn intern(s: &str) -> Self {
                $name(INTERNER.get_or_intern(s))
            }

            /// Resolve back to a string slice.
            pub fn as_str(&self) -> &str {
                INTERNER.resolve(&self.0)
            }

            /// Generate a unique id with a prefix (e.g. `rect_12`).
            pub fn with_prefix(prefix: &str) -> Self {
                Self::intern(&format!("{prefix}_{}", next_suffix()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $sigil, self.as_str())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $sigil, self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok($name::intern(&s))
            }
        }
    };
}

interned_id!(
    /// Stable identifier of a node in the scene graph.
    NodeId,
    "@"
);

interned_id!(
    /// Identifier of a registered component definition.
    ComponentId,
    "#"
);

interned_id!(
    /// Identifier of a variant set grouping sibling component definitions.
    VariantSetId,
    "%"
);

impl NodeId {
    /// Generate a unique anonymous node id.
    pub fn anonymous() -> Self {
        Self::with_prefix("_anon")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = NodeId::intern("login_form");
        let b = NodeId::intern("login_form");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "login_form");
    }

    #[test]
    fn anonymous_ids_are_unique() {
        let a = NodeId::anonymous();
        let b = NodeId::anonymous();
        assert_ne!(a, b);
    }

    #[test]
    fn id_kinds_share_interner_but_not_type() {
        let node = NodeId::intern("button");
        let component = ComponentId::intern("button");
        assert_eq!(node.as_str(), component.as_str());
        assert_eq!(format!("{node}"), "@button");
        assert_eq!(format!("{component}"), "#button");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = NodeId::intern("card");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"card\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
