//! GF(256) arithmetic over the AES reduction polynomial `0x11B`.
//!
//! This is the field the [`crate::shamir`] module builds its polynomials
//! over: every secret byte is a field element, every share is a polynomial
//! evaluation, and reconstruction is Lagrange interpolation at `x = 0`.
//!
//! Multiplication and division are implemented via precomputed log/antilog
//! tables rather than the textbook carry-less multiply-then-reduce, which
//! keeps every operation a small number of table lookups and avoids
//! secret-dependent branches in the hot path. The tables are generated from
//! `GENERATOR = 3`, the smallest element of order 255 for this polynomial.
//! `2` is *not* a valid choice here: it has order 51, not 255, and log
//! tables built from it silently alias distinct field elements to the same
//! logarithm. [`FieldTables::init`] asserts the generated table is a
//! genuine bijection on the non-zero elements to catch this class of bug at
//! startup rather than in a subtly wrong share.

use std::sync::OnceLock;

use thiserror::Error;

/// AES/Rijndael reduction polynomial x^8 + x^4 + x^3 + x + 1.
const REDUCING_POLY: u16 = 0x11B;

/// Generator of the full multiplicative group of GF(256) under `REDUCING_POLY`.
const GENERATOR: u8 = 3;

/// Errors raised by field and polynomial operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// Division by the zero element.
    #[error("division by zero in GF(256)")]
    DivByZero,
    /// Two interpolation points shared the same x-coordinate.
    #[error("duplicate x-coordinate {0} in interpolation set")]
    DuplicateX(u8),
}

/// Precomputed discrete-log / antilog tables for GF(256).
///
/// Construction is `O(255)` and happens once per process; [`tables`]
/// caches the result behind a [`OnceLock`].
pub struct FieldTables {
    /// `log[a]` for non-zero `a`; `log[0]` is unused (set to 0).
    log: [u8; 256],
    /// `antilog[i] = GENERATOR^i`, doubled to `512` entries so additions of
    /// two logs in `[0, 254]` never need a modulo-255 branch.
    antilog: [u8; 512],
}

impl FieldTables {
    fn init() -> Self {
        let mut antilog = [0u8; 512];
        let mut log = [0u8; 256];

        let mut x: u16 = 1;
        for i in 0..255usize {
            antilog[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= REDUCING_POLY;
            }
        }
        // mirror so indices up to 509 are valid without a modulo
        for i in 255..512 {
            antilog[i] = antilog[i - 255];
        }

        let tables = Self { log, antilog };
        tables.assert_full_order();
        tables
    }

    /// Asserts every non-zero byte appears exactly once in the antilog
    /// table, i.e. that `GENERATOR` generates the full 255-element group.
    fn assert_full_order(&self) {
        let mut seen = [false; 256];
        for &v in &self.antilog[0..255] {
            assert!(v != 0, "GF(256) generator produced a zero element");
            assert!(
                !seen[v as usize],
                "GF(256) generator {GENERATOR} does not generate the full group \
                 (value {v} produced more than once) - this is a hard invariant, \
                 not a recoverable error"
            );
            seen[v as usize] = true;
        }
        for v in 1u16..256 {
            assert!(
                seen[v as usize],
                "GF(256) generator {GENERATOR} never produced byte {v}"
            );
        }
    }
}

fn tables() -> &'static FieldTables {
    static TABLES: OnceLock<FieldTables> = OnceLock::new();
    TABLES.get_or_init(FieldTables::init)
}

/// `a XOR b`. GF(256) addition and subtraction coincide (characteristic 2).
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// `a XOR b`. Identical to [`add`]; kept as a separate name at call sites
/// that read as "subtract" (e.g. Lagrange denominators).
#[inline]
pub fn sub(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Field multiplication via log/antilog tables.
#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables();
    let log_sum = t.log[a as usize] as usize + t.log[b as usize] as usize;
    t.antilog[log_sum]
}

/// Field division. Fails with [`FieldError::DivByZero`] when `b == 0`.
#[inline]
pub fn div(a: u8, b: u8) -> Result<u8, FieldError> {
    if b == 0 {
        return Err(FieldError::DivByZero);
    }
    if a == 0 {
        return Ok(0);
    }
    let t = tables();
    let log_diff = 255 + t.log[a as usize] as i32 - t.log[b as usize] as i32;
    Ok(t.antilog[log_diff as usize])
}

/// Evaluates a polynomial given by its coefficients (lowest degree first,
/// i.e. `coeffs[0]` is the constant term / secret byte) at `x` using
/// Horner's method.
pub fn eval(coeffs: &[u8], x: u8) -> u8 {
    let mut acc = 0u8;
    for &c in coeffs.iter().rev() {
        acc = add(mul(acc, x), c);
    }
    acc
}

/// Reconstructs `p(0)` from a set of `(x, y)` points on a polynomial `p`
/// via Lagrange interpolation.
///
/// Fails with [`FieldError::DuplicateX`] if any two points share an
/// x-coordinate: if undetected, such a pair silently drops information
/// instead of contributing an independent constraint, which would make the
/// resulting byte wrong without any other symptom.
pub fn interpolate_at_zero(points: &[(u8, u8)]) -> Result<u8, FieldError> {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            if points[i].0 == points[j].0 {
                return Err(FieldError::DuplicateX(points[i].0));
            }
        }
    }

    let mut secret = 0u8;
    for (i, &(xi, yi)) in points.iter().enumerate() {
        let mut num = 1u8;
        let mut den = 1u8;
        for (j, &(xj, _)) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            // numerator: product of xj (the term "- xi" becomes "xor xi" below)
            num = mul(num, xj);
            den = mul(den, sub(xj, xi));
        }
        let lagrange_coeff = div(num, den)?;
        secret = add(secret, mul(yi, lagrange_coeff));
    }
    Ok(secret)
}
