//! Newtype IDs for type-safe entity references.
//!
//! The hosted backend identifies rows with opaque strings (UUIDs for
//! products, auth subject ids for users). Use the `define_id!` macro to
//! create wrappers that prevent accidentally mixing IDs from different
//! entity types while keeping the plain-string JSON shape.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>`, `AsRef<str>` and `Display`
///
/// # Example
///
/// ```rust
/// # use vitrine_core::define_id;
/// define_id!(WatchId);
/// define_id!(StrapId);
///
/// let watch = WatchId::new("w1");
/// assert_eq!(watch.as_str(), "w1");
///
/// // These are different types, so this won't compile:
/// // let _: WatchId = StrapId::new("s1");
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

            /// Consume the ID, returning the underlying string.
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

define_id!(ProductId);
define_id!(UserId);

impl ProductId {
    /// Prefix used for ids minted when an incoming product has none.
    pub const SYNTHETIC_PREFIX: &'static str = "product-";

    /// Mint a fallback id for a product shape that arrived without one.
    #[must_use]
    pub fn synthetic() -> Self {
        Self(format!("{}{}", Self::SYNTHETIC_PREFIX, uuid::Uuid::new_v4()))
    }

    /// Whether this id was minted by [`ProductId::synthetic`].
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(Self::SYNTHETIC_PREFIX)
    }
}
