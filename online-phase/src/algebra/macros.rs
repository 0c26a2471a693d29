//! Defines macros useful for creating arithmetic implementations
//!
//! Each arithmetic operation is written once between two references; the
//! macros derive the owned and partially-owned variants from it. Call sites
//! must have `ark_ff::PrimeField` in scope

/// Derive the owned variants of a binary operation implemented on references
macro_rules! impl_owned_variants {
    ($trait:ident, $fn_name:ident, $lhs:ty, $rhs:ty, $out:ty) => {
        impl<F: PrimeField> $trait<$rhs> for &$lhs {
            type Output = $out;

            fn $fn_name(self, rhs: $rhs) -> Self::Output {
                <&$lhs as $trait<&$rhs>>::$fn_name(self, &rhs)
            }
        }

        impl<F: PrimeField> $trait<&$rhs> for $lhs {
            type Output = $out;

            fn $fn_name(self, rhs: &$rhs) -> Self::Output {
                <&$lhs as $trait<&$rhs>>::$fn_name(&self, rhs)
            }
        }

        impl<F: PrimeField> $trait<$rhs> for $lhs {
            type Output = $out;

            fn $fn_name(self, rhs: $rhs) -> Self::Output {
                <&$lhs as $trait<&$rhs>>::$fn_name(&self, &rhs)
            }
        }
    };
}

/// Derive the owned variant of a unary operation implemented on a reference
macro_rules! impl_owned_unary {
    ($trait:ident, $fn_name:ident, $target:ty) => {
        impl<F: PrimeField> $trait for $target {
            type Output = $target;

            fn $fn_name(self) -> Self::Output {
                <&$target as $trait>::$fn_name(&self)
            }
        }
    };
}

/// Derive the flipped-operand variants of a commutative binary operation
/// implemented with `$lhs` on the left
macro_rules! impl_flipped_variants {
    ($trait:ident, $fn_name:ident, $lhs:ty, $rhs:ty, $out:ty) => {
        impl<F: PrimeField> $trait<&$lhs> for &$rhs {
            type Output = $out;

            fn $fn_name(self, rhs: &$lhs) -> Self::Output {
                <&$lhs as $trait<&$rhs>>::$fn_name(rhs, self)
            }
        }

        impl<F: PrimeField> $trait<$lhs> for $rhs {
            type Output = $out;

            fn $fn_name(self, rhs: $lhs) -> Self::Output {
                <&$lhs as $trait<&$rhs>>::$fn_name(&rhs, &self)
            }
        }
    };
}

pub(crate) use impl_flipped_variants;
pub(crate) use impl_owned_unary;
pub(crate) use impl_owned_variants;
