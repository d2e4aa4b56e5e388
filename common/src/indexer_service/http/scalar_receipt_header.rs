// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Typed extraction of the `Scalar-Receipt` header carrying the 264-hex
//! character receipt blob described in the wire format.

use axum::http::HeaderValue;
use axum_extra::headers::{Error, Header, HeaderName};

pub static SCALAR_RECEIPT_HEADER_NAME: HeaderName = HeaderName::from_static("scalar-receipt");

/// The raw hex payload of a receipt, unparsed. Parsing into
/// `allocation(20) || fees(32) || id(15) || signature(65)` happens in the
/// receipt store, since that's where the byte layout is a shared
/// invariant with the write-behind buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalarReceipt(pub Option<String>);

impl Header for ScalarReceipt {
    fn name() -> &'static HeaderName {
        &SCALAR_RECEIPT_HEADER_NAME
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next();
        match value {
            None => Ok(ScalarReceipt(None)),
            Some(value) => {
                let s = value.to_str().map_err(|_| Error::invalid())?;
                Ok(ScalarReceipt(Some(s.to_string())))
            }
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Some(receipt) = &self.0 {
            if let Ok(value) = HeaderValue::from_str(receipt) {
                values.extend(std::iter::once(value));
            }
        }
    }
}
