//! Describes the prime field an MPC session computes over

use ark_ff::PrimeField;
use num_bigint::{BigInt, BigUint, Sign};

use super::Scalar;

/// The public parameters of a prime field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDefinition {
    /// The field's modulus
    modulus: BigUint,
    /// The bit length of the modulus
    bit_length: usize,
}

impl FieldDefinition {
    /// Build the definition of the given arkworks field
    pub fn of<F: PrimeField>() -> Self {
        Self { modulus: F::MODULUS.into(), bit_length: F::MODULUS_BIT_SIZE as usize }
    }

    /// The field's modulus
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// The bit length of the modulus
    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    /// The number of bytes needed to hold a field element
    pub fn byte_length(&self) -> usize {
        (self.bit_length + 7) / 8
    }

    /// Interpret a field element as a signed integer in `(-p/2, p/2]`
    pub fn convert_to_signed<F: PrimeField>(&self, value: &Scalar<F>) -> BigInt {
        let unsigned = value.to_biguint();
        let half = &self.modulus >> 1u32;
        if unsigned > half {
            BigInt::from_biguint(Sign::Minus, &self.modulus - unsigned)
        } else {
            BigInt::from_biguint(Sign::Plus, unsigned)
        }
    }
}

#[cfg(test)]
mod test {
    use num_bigint::BigInt;

    use crate::test_helpers::{TestField, TestScalar};

    use super::FieldDefinition;

    /// Tests the lengths reported for the bn254 scalar field
    #[test]
    fn test_bn254_lengths() {
        let def = FieldDefinition::of::<TestField>();
        assert_eq!(def.bit_length(), 254);
        assert_eq!(def.byte_length(), 32);
    }

    /// Tests that elements above half the modulus read as negative
    #[test]
    fn test_signed_conversion() {
        let def = FieldDefinition::of::<TestField>();

        let minus_three = TestScalar::zero() - TestScalar::from(3u8);
        assert_eq!(def.convert_to_signed(&minus_three), BigInt::from(-3));
        assert_eq!(def.convert_to_signed(&TestScalar::from(7u8)), BigInt::from(7));
    }
}
