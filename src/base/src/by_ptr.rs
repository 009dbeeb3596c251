use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use derive_more::{Constructor, Deref, From};

/// Compares, orders, and hashes a smart pointer by the address of its
/// pointee rather than by value.
#[derive(Clone, Constructor, Copy, Debug, Deref, From)]
#[deref(forward)]
#[repr(transparent)]
pub struct ByPtr<P> {
    inner: P,
}

macro_rules! delegate {
    ($trait:ident::$fn:ident -> $ret:ty) => {
        #[inline(always)]
        fn $fn(&self, other: &Self) -> $ret {
            $trait::$fn(&ByPtr::addr(self), &ByPtr::addr(other))
        }
    }
}

impl<P: Deref> PartialEq for ByPtr<P> {
    delegate!(PartialEq::eq -> bool);
}

impl<P: Deref> Eq for ByPtr<P> {}

impl<P: Deref> PartialOrd for ByPtr<P> {
    delegate!(PartialOrd::partial_cmp -> Option<Ordering>);
}

impl<P: Deref> Ord for ByPtr<P> {
    delegate!(Ord::cmp -> Ordering);
}

impl<P: Deref> Hash for ByPtr<P> {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        ByPtr::addr(self).hash(state);
    }
}

impl<P> ByPtr<P> {
    #[inline(always)]
    pub fn by_value(this: &Self) -> &P {
        &this.inner
    }

    #[inline(always)]
    pub fn by_ptr(ptr: &P) -> &Self {
        // SAFETY: ByPtr<P> is repr(transparent) over P.
        unsafe { &*(ptr as *const P as *const Self) }
    }

    #[inline(always)]
    pub fn into_inner(this: Self) -> P {
        this.inner
    }
}

impl<P: Deref> ByPtr<P> {
    #[inline(always)]
    pub fn as_ptr(this: &Self) -> *const P::Target {
        this.deref() as *const _
    }

    // Thin address; metadata of unsized pointees is ignored.
    #[inline(always)]
    fn addr(this: &Self) -> usize {
        Self::as_ptr(this) as *const u8 as usize
    }
}

impl<'a, P> From<&'a P> for &'a ByPtr<P> {
    #[inline(always)]
    fn from(by_val: &'a P) -> Self {
        ByPtr::by_ptr(by_val)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn identity_not_value() {
        let a = Arc::new(7u32);
        let b = Arc::new(7u32);

        let mut set = HashSet::new();
        assert!(set.insert(ByPtr::new(Arc::clone(&a))));
        assert!(!set.insert(ByPtr::new(Arc::clone(&a))));
        assert!(set.insert(ByPtr::new(Arc::clone(&b))));
        assert_eq!(set.len(), 2);

        assert!(set.contains(ByPtr::by_ptr(&a)));
        assert_eq!(Arc::strong_count(&a), 2);
    }

    #[test]
    fn ordering_is_total() {
        let x = 1i32;
        let y = 1i32;
        let p = ByPtr::new(&x);
        let q = ByPtr::new(&x);
        let r = ByPtr::new(&y);

        assert_eq!(p, q);
        assert_ne!(p, r);
        assert!(!(p < q) & !(p > q));
        assert!((p < r) ^ (p > r));
        assert_eq!(*ByPtr::by_value(&r), &y);
    }
}
