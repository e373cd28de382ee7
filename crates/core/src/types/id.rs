//! Newtype IDs for type-safe entity references.
//!
//! The delivery backend addresses everything with opaque strings. Use the
//! `define_id!` macro to create wrappers that prevent accidentally mixing a
//! product ID with a store ID or a user ID with a guest cart ID.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `AsRef<str>` implementations
///
/// # Example
///
/// ```rust
/// # use bazaar_core::define_id;
/// define_id!(OrderId);
/// define_id!(CourierId);
///
/// let order_id = OrderId::new("ord_1");
/// let courier_id = CourierId::new("ord_1");
///
/// // These are different types, so this won't compile:
/// // let _: OrderId = courier_id;
/// assert_eq!(order_id.as_str(), courier_id.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(ProductId);
define_id!(StoreId);
define_id!(UserId);
define_id!(GuestCartId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_str() {
        let id = ProductId::new("p1");
        assert_eq!(id.to_string(), "p1");
        assert_eq!(id.as_str(), "p1");
        assert_eq!(String::from(id), "p1");
    }

    #[test]
    fn test_id_serde_transparent() {
        let id: StoreId = serde_json::from_str("\"s1\"").unwrap();
        assert_eq!(id, StoreId::from("s1"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s1\"");
    }
}
