//! Order identifier.
//!
//! On the wire an order UID is a plain string; inside the domain it is an
//! [`OrderUid`], which can only be obtained by parsing a well-formed UUID.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors that can occur when parsing an [`OrderUid`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderUidError {
    /// The input string is empty.
    #[error("order uid cannot be empty")]
    Empty,
    /// The input is not a UUID.
    #[error("order uid is not a valid UUID: {0}")]
    Malformed(String),
}

/// Globally unique order identifier.
///
/// ```
/// use orderflow_core::OrderUid;
///
/// assert!(OrderUid::parse("b563feb7-b2b8-4b6b-9b45-4c1e4c1e4c1e").is_ok());
/// assert!(OrderUid::parse("").is_err());
/// assert!(OrderUid::parse("does-not-exist").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderUid(Uuid);

impl OrderUid {
    /// Parse an `OrderUid` from its textual form.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not a UUID.
    pub fn parse(s: &str) -> Result<Self, OrderUidError> {
        if s.is_empty() {
            return Err(OrderUidError::Empty);
        }

        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| OrderUidError::Malformed(e.to_string()))
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OrderUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hyphenated lowercase, the same shape producers send
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for OrderUid {
    type Err = OrderUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for OrderUid {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<OrderUid> for Uuid {
    fn from(id: OrderUid) -> Self {
        id.0
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Type<::sqlx::Postgres> for OrderUid {
    fn type_info() -> ::sqlx::postgres::PgTypeInfo {
        <Uuid as ::sqlx::Type<::sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
        <Uuid as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for OrderUid {
    fn decode(
        value: ::sqlx::postgres::PgValueRef<'r>,
    ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
        let id = <Uuid as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
        Ok(Self(id))
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Encode<'_, ::sqlx::Postgres> for OrderUid {
    fn encode_by_ref(
        &self,
        buf: &mut ::sqlx::postgres::PgArgumentBuffer,
    ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
        <Uuid as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
