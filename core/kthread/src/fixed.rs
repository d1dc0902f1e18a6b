// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! 17.14 fixed-point numbers.
//!
//! A [`Fixed`] wraps an `i32` whose value is the represented real number
//! multiplied by 2^14. The wrapper exists so the raw integer is never mistaken
//! for an ordinary count: every conversion goes through a named method.

use core::{
    fmt,
    ops::{Add, Div, Mul, Sub},
};

/// Number of fractional bits.
pub const FRACTION_BITS: u32 = 14;

/// Scale factor between a plain integer and its fixed-point encoding.
const F: i32 = 1 << FRACTION_BITS;

/// A signed 17.14 fixed-point number.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(i32);

impl Fixed {
    /// The fixed-point zero.
    pub const ZERO: Self = Self(0);
    /// The fixed-point one.
    pub const ONE: Self = Self(F);

    /// Converts an integer to fixed point.
    #[inline]
    pub const fn from_int(n: i32) -> Self {
        Self(n * F)
    }

    /// Wraps an already scaled value.
    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the scaled representation.
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Converts to an integer, rounding toward zero.
    #[inline]
    pub const fn to_int_trunc(self) -> i32 {
        self.0 / F
    }

    /// Converts to an integer, rounding to the nearest integer.
    ///
    /// Halves round away from zero.
    #[inline]
    pub const fn to_int_round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + F / 2) / F
        } else {
            (self.0 - F / 2) / F
        }
    }

    /// Adds an integer.
    #[inline]
    pub const fn add_int(self, n: i32) -> Self {
        Self(self.0 + n * F)
    }

    /// Subtracts an integer.
    #[inline]
    pub const fn sub_int(self, n: i32) -> Self {
        Self(self.0 - n * F)
    }

    /// Multiplies by an integer. Only one operand carries the scale, so no
    /// rescale is needed.
    #[inline]
    pub const fn mul_int(self, n: i32) -> Self {
        Self(self.0 * n)
    }

    /// Divides by an integer.
    #[inline]
    pub const fn div_int(self, n: i32) -> Self {
        Self(self.0 / n)
    }
}

impl Add for Fixed {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Fixed {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul for Fixed {
    type Output = Self;

    /// The product is formed in 64 bits before the scale is divided out.
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self((self.0 as i64 * rhs.0 as i64 / F as i64) as i32)
    }
}

impl Div for Fixed {
    type Output = Self;

    /// The dividend is widened and pre-scaled in 64 bits.
    #[inline]
    fn div(self, rhs: Self) -> Self {
        Self((self.0 as i64 * F as i64 / rhs.0 as i64) as i32)
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({}/{})", self.0, F)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Two decimals are enough for load averages and recent CPU.
        let hundredths = self.mul_int(100).to_int_round();
        let sign = if hundredths < 0 { "-" } else { "" };
        let abs = hundredths.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
