use std::fmt;

pub(crate) type SmallVec<T, const N: usize> = smallvec::SmallVec<[T; N]>;

macro_rules! bit {
    ($bit:expr) => {
        (1 << $bit)
    }
}

/// Returns a precondition error from the enclosing function unless
/// `$cond` holds.
macro_rules! precondition {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::Error::Precondition(format!($($arg)+)));
        }
    }
}

/// Objects which may carry a human-readable debug name.
pub trait Named {
    fn name(&self) -> Option<&str>;
}

pub struct NamedFmt<'a, T: ?Sized>(&'a T);

impl<T: Named + ?Sized> fmt::Debug for NamedFmt<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.name() {
            Some(name) => write!(f, "{:?}", name),
            None => write!(f, "<{}>", short_type_name::<T>()),
        }
    }
}

/// Formats an object by its debug name, falling back to its type.
pub fn fmt_named<T: Named + ?Sized>(obj: &T) -> NamedFmt<'_, T> {
    NamedFmt(obj)
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}
