// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: LGPL-3.0-or-later

//! # Utils used by other modules.

use std::fmt;
use std::marker::PhantomData;

use serde::de;

/// Visitor to deserialize any type implementing `TryFrom<&str>` from a string.
#[derive(Debug)]
pub(crate) struct TryFromStrVisitor<T> {
    expecting: &'static str,
    phantom: PhantomData<T>,
}

impl<T> TryFromStrVisitor<T> {
    pub(crate) fn new(expecting: &'static str) -> Self {
        Self {
            expecting,
            phantom: PhantomData,
        }
    }
}

impl<T> de::Visitor<'_> for TryFromStrVisitor<T>
where
    T: for<'a> TryFrom<&'a str>,
{
    type Value = T;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}", self.expecting)
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        T::try_from(s).map_err(|_| de::Error::invalid_value(de::Unexpected::Str(s), &self))
    }
}
