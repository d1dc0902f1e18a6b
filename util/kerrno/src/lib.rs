// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Error codes shared by the scheduler and its collaborators.
//!
//! Only recoverable conditions are represented here. Kernel bugs (a broken
//! state-machine precondition, a clobbered stack guard) are not errors: they
//! halt with a diagnostic at the point of detection.

#![cfg_attr(not(test), no_std)]

use core::fmt;

use strum::EnumCount;

/// The kind of a recoverable kernel error.
#[repr(i32)]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, EnumCount)]
pub enum KErrorKind {
    /// Not enough memory for a kernel stack or an execution context.
    NoMemory = 1,
    /// No live thread with the requested id.
    NoSuchThread,
}

impl KErrorKind {
    /// Returns the error description.
    pub fn as_str(&self) -> &'static str {
        use KErrorKind::*;
        match *self {
            NoMemory => "Out of memory",
            NoSuchThread => "No such thread",
        }
    }

    /// Returns the error code value in `i32`.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for KErrorKind {
    type Error = i32;

    #[inline]
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use KErrorKind::*;
        Ok(match value {
            1 => NoMemory,
            2 => NoSuchThread,
            _ => return Err(value),
        })
    }
}

impl fmt::Display for KErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The error type returned by fallible scheduler operations.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct KError(KErrorKind);

impl KError {
    const fn new(kind: KErrorKind) -> Self {
        KError(kind)
    }

    /// Returns the kind of this error.
    pub const fn kind(self) -> KErrorKind {
        self.0
    }

    /// Returns the error code value in `i32`.
    pub const fn code(self) -> i32 {
        self.0.code()
    }

    /// Rebuilds an error from its code.
    pub fn try_from_i32(value: i32) -> Result<Self, i32> {
        KErrorKind::try_from(value).map(KError::new)
    }
}

impl From<KErrorKind> for KError {
    fn from(kind: KErrorKind) -> Self {
        KError::new(kind)
    }
}

impl From<KError> for KErrorKind {
    fn from(e: KError) -> Self {
        e.0
    }
}

impl fmt::Debug for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KErrorKind::{:?}", self.0)
    }
}

impl fmt::Display for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! kerror_consts {
    ($($name:ident),*) => {
        #[allow(non_upper_case_globals)]
        impl KError {
            $(
                #[doc = concat!("An [`KError`] with kind [`KErrorKind::", stringify!($name), "`].")]
                pub const $name: Self = Self::new(KErrorKind::$name);
            )*
        }
    };
}

kerror_consts!(NoMemory, NoSuchThread);

/// A specialized [`Result`] type with [`KError`] as the error type.
pub type KResult<T = ()> = Result<T, KError>;

/// Construct a [`KError`] while printing a warning message.
///
/// # Examples
///
/// ```
/// # use kerrno::{k_err_type, KError};
/// assert_eq!(k_err_type!(NoMemory), KError::NoMemory);
/// assert_eq!(
///     k_err_type!(NoMemory, "stack allocation failed"),
///     KError::NoMemory,
/// );
/// ```
#[macro_export]
macro_rules! k_err_type {
    ($err:ident) => {{
        use $crate::KErrorKind::*;
        let err = $crate::KError::from($err);
        $crate::__priv::warn!("[{:?}]", err);
        err
    }};
    ($err:ident, $msg:expr) => {{
        use $crate::KErrorKind::*;
        let err = $crate::KError::from($err);
        $crate::__priv::warn!("[{:?}] {}", err, $msg);
        err
    }};
}

/// Construct an [`Err(KError)`] while printing a warning message.
///
/// # Examples
///
/// ```
/// # use kerrno::{k_err, KResult, KError};
/// assert_eq!(k_err!(NoSuchThread), KResult::<()>::Err(KError::NoSuchThread));
/// ```
/// [`Err(KError)`]: Err
#[macro_export]
macro_rules! k_err {
    ($err:ident) => {
        Err($crate::k_err_type!($err))
    };
    ($err:ident, $msg:expr) => {
        Err($crate::k_err_type!($err, $msg))
    };
}

#[doc(hidden)]
pub mod __priv {
    pub use log::warn;
}
