// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Strict conversion of local values into wire values
//!
//! `serde_json` writes NaN and infinities as `null`. Values headed for the
//! worker are walked once with [`FiniteCheck`] first so such numbers fail
//! instead of silently changing.

use serde::ser::{self, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("non-finite number {0} cannot be encoded")]
    NonFinite(f64),

    #[error("{0}")]
    Custom(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ser::Error for EncodeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        EncodeError::Custom(msg.to_string())
    }
}

/// Convert `value` to JSON, rejecting NaN and infinities
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, EncodeError> {
    value.serialize(FiniteCheck)?;
    Ok(serde_json::to_value(value)?)
}

/// Serializer that produces nothing and fails on the first non-finite float
#[derive(Clone, Copy)]
struct FiniteCheck;

fn check(v: f64) -> Result<(), EncodeError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(EncodeError::NonFinite(v))
    }
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = EncodeError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), EncodeError> {
        check(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), EncodeError> {
        check(v)
    }

    fn serialize_char(self, _: char) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), EncodeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), EncodeError> {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, EncodeError> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, EncodeError> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, EncodeError> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, EncodeError> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, EncodeError> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, EncodeError> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, EncodeError> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), EncodeError> {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), EncodeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Frame {
        name: &'static str,
        origin: Option<[f64; 3]>,
    }

    #[test]
    fn test_finite_values_pass_through() {
        let frame = Frame {
            name: "base",
            origin: Some([0.0, 1.5, -2.0]),
        };
        assert_eq!(
            to_value(&frame).unwrap(),
            json!({"name": "base", "origin": [0.0, 1.5, -2.0]})
        );
        assert_eq!(to_value(&vec![[1, 2, 3]]).unwrap(), json!([[1, 2, 3]]));
    }

    #[test]
    fn test_nan_and_infinity_rejected() {
        assert!(matches!(
            to_value(&[[f64::INFINITY, 0.0, 1.0]]),
            Err(EncodeError::NonFinite(v)) if v.is_infinite()
        ));
        assert!(matches!(to_value(&vec![f32::NAN]), Err(EncodeError::NonFinite(_))));

        let nested = Frame {
            name: "broken",
            origin: Some([0.0, f64::NEG_INFINITY, 0.0]),
        };
        assert!(to_value(&nested).is_err());

        let mut map = BTreeMap::new();
        map.insert("scale", f64::NAN);
        assert!(to_value(&map).is_err());
    }
}
