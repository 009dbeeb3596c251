#![allow(clippy::len_without_is_empty)]

use derivative::Derivative;
use derive_more::{From, Index, IndexMut};
use enum_map::{Enum, EnumMap};
use num_traits::{One, Zero};

/// A numeric array indexed by an enum. Arithmetic is element-wise, and
/// scalars broadcast to every element.
#[derive(Derivative, From, Index, IndexMut)]
#[derivative(Clone(bound="EnumMap<K, V>: Clone"))]
#[derivative(Copy(bound="EnumMap<K, V>: Copy"))]
#[derivative(Debug(bound="EnumMap<K, V>: std::fmt::Debug"))]
#[derivative(Default(bound="EnumMap<K, V>: Default"))]
#[derivative(Eq(bound="EnumMap<K, V>: Eq"))]
#[derivative(PartialEq(bound="EnumMap<K, V>: PartialEq"))]
pub struct EnumVector<K: Enum<V>, V> {
    inner: EnumMap<K, V>,
}

impl<K: Enum<V>, V: Copy> From<V> for EnumVector<K, V> {
    fn from(val: V) -> Self {
        Self::lift(val)
    }
}

impl<K: Enum<V>, V: Zero + Copy> EnumVector<K, V> {
    pub fn zero() -> Self {
        Self::lift(V::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.values().all(|v| v.is_zero())
    }
}

impl<K: Enum<V>, V: One + Copy> EnumVector<K, V> {
    pub fn one() -> Self {
        Self::lift(V::one())
    }
}

impl<K: Enum<V>, V: Copy> EnumVector<K, V> {
    pub fn lift(elem: V) -> Self {
        Self::from_fn(|_| elem)
    }
}

impl<K: Enum<V>, V> EnumVector<K, V> {
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.inner.iter_mut()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.inner.values_mut()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn from_fn(f: impl FnMut(K) -> V) -> Self {
        Self { inner: f.into() }
    }

    pub fn into_map(self) -> EnumMap<K, V> {
        self.inner
    }
}

macro_rules! impl_bin_op {
    ($Op:ident, $OpAssign:ident, $op:ident, $op_assign:ident) => {
        impl<K: Enum<V>, V> std::ops::$OpAssign for EnumVector<K, V>
            where V: std::ops::$OpAssign + Copy,
        {
            fn $op_assign(&mut self, other: Self) {
                for (k, v) in self.iter_mut() {
                    <V as std::ops::$OpAssign>::$op_assign(v, other[k]);
                }
            }
        }

        impl<K: Enum<V>, V> std::ops::$OpAssign<V> for EnumVector<K, V>
            where V: std::ops::$OpAssign + Copy,
        {
            fn $op_assign(&mut self, other: V) {
                for v in self.values_mut() {
                    <V as std::ops::$OpAssign>::$op_assign(v, other);
                }
            }
        }

        impl<K: Enum<V>, V> std::ops::$Op for EnumVector<K, V>
            where V: std::ops::$OpAssign + Copy,
        {
            type Output = Self;
            fn $op(mut self, other: Self) -> Self::Output {
                <Self as std::ops::$OpAssign>::$op_assign(&mut self, other);
                self
            }
        }

        impl<K: Enum<V>, V> std::ops::$Op<V> for EnumVector<K, V>
            where V: std::ops::$OpAssign + Copy,
        {
            type Output = Self;
            fn $op(mut self, other: V) -> Self::Output {
                <Self as std::ops::$OpAssign<V>>::$op_assign(&mut self, other);
                self
            }
        }
    }
}

impl_bin_op!(Add, AddAssign, add, add_assign);
impl_bin_op!(Sub, SubAssign, sub, sub_assign);
impl_bin_op!(Mul, MulAssign, mul, mul_assign);
impl_bin_op!(Div, DivAssign, div, div_assign);

#[macro_export]
macro_rules! enum_vec {
    ($($body:tt)*) => {
        $crate::EnumVector::from(enum_map::enum_map!($($body)*))
    }
}

#[cfg(test)]
mod tests {
    use enum_map::Enum;
    use super::*;
    use self::Heap::*;

    #[derive(Clone, Copy, Debug, Enum, Eq, PartialEq)]
    enum Heap {
        Views,
        Samplers,
        Targets,
    }

    #[test]
    fn counts_arithmetic() {
        let a = enum_vec!(Views => 4u32, Samplers => 1, Targets => 0);
        let b = enum_vec!(Views => 1u32, Samplers => 1, Targets => 2);

        assert_eq!(a + b, enum_vec!(Views => 5u32, Samplers => 2, Targets => 2));
        assert_eq!(a * 2, enum_vec!(Views => 8u32, Samplers => 2, Targets => 0));
        assert_eq!((a * 3) / 3, a);
        assert_eq!(a.values().sum::<u32>(), 5);
        assert_eq!([a[Views], a[Samplers], a[Targets]], [4, 1, 0]);

        let mut c = a;
        c -= EnumVector::lift(0);
        assert_eq!(c, a);
        c -= a;
        assert!(c.is_zero());
        assert_eq!(c, EnumVector::zero());
        assert_eq!(EnumVector::<Heap, u32>::one().values().sum::<u32>(), 3);
    }
}
