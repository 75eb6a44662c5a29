//! Opaque in-memory table representations.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime identity of a payload type, used to pick a hook.
#[derive(Debug, Clone, Copy)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Fully qualified Rust type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadType {}

impl Hash for PayloadType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A table value in some in-memory representation.
///
/// The store never looks inside a payload; a [`crate::hooks::TableHook`]
/// registered for its [`PayloadType`] does. Implementations for foreign
/// dataframe types live next to their hooks.
pub trait Payload: Any + Send + Sync + fmt::Debug {
    fn payload_type(&self) -> PayloadType;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// Stable text identifying the payload's content, if it can be derived
    /// without touching the database.
    fn content_fingerprint(&self) -> Option<String> {
        None
    }
}

impl dyn Payload {
    pub fn is<T: Payload>(&self) -> bool {
        self.payload_type().is::<T>()
    }

    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Frame(u32);

    impl Payload for Frame {
        fn payload_type(&self) -> PayloadType {
            PayloadType::of::<Self>()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
            self
        }
    }

    #[test]
    fn test_payload_type_identity() {
        assert_eq!(PayloadType::of::<Frame>(), PayloadType::of::<Frame>());
        assert_ne!(PayloadType::of::<Frame>(), PayloadType::of::<String>());
        assert!(PayloadType::of::<Frame>().name().ends_with("Frame"));
    }

    #[test]
    fn test_downcast() {
        let payload: Box<dyn Payload> = Box::new(Frame(3));
        assert!(payload.is::<Frame>());
        assert_eq!(payload.downcast_ref::<Frame>().map(|f| f.0), Some(3));
        assert!(payload.content_fingerprint().is_none());

        let frame = payload.into_any().downcast::<Frame>().unwrap();
        assert_eq!(frame.0, 3);
    }
}
