use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::MemoError;

/// A single argument reduced to a stable, hashable representation.
///
/// Value-like inputs keep their value, while object-like inputs are replaced by
/// an [`IdentityToken`]. Two distinct objects with identical contents are
/// therefore different arguments, but the same object is always the same
/// argument for as long as it lives.
///
/// All integer widths collapse into [`Argument::Int`], so `5u8` and `5i64`
/// discriminate the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Argument {
    /// `()`, `None`
    Null,
    Bool(bool),
    Int(i128),
    /// `u128` values that do not fit in an `i128`
    Wide(u128),
    /// IEEE-754 bit pattern of the value widened to `f64`; `-0.0` is folded into `0.0`
    Float(u64),
    Char(char),
    Str(String),
    /// Slices, vectors, arrays and tuples, compared element by element
    List(Vec<Argument>),
    Identity(IdentityToken),
}

/// Identity of an object-like argument.
///
/// Tokens are compared, never the object's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityToken {
    /// Unique id handed out by [`Identity::new`]
    Issued(u64),
    /// Address of a heap allocation (`Arc`, `Rc`) or a borrowed value
    Address(usize),
}

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// An identity handle to embed in types that should be memoization arguments.
///
/// Every construction issues a fresh process-unique id. Cloning also issues a
/// fresh id: a clone is a different instance, so it must not share cache
/// entries with the original.
///
/// # Examples
///
/// ```
/// use oncely_core::{HasIdentity, Identity};
///
/// struct Connection {
///     identity: Identity,
/// }
///
/// impl HasIdentity for Connection {
///     fn identity(&self) -> oncely_core::IdentityToken {
///         self.identity.token()
///     }
/// }
///
/// let a = Connection { identity: Identity::new() };
/// let b = Connection { identity: Identity::new() };
/// assert_ne!(a.identity(), b.identity());
/// assert_eq!(a.identity(), a.identity());
/// ```
pub struct Identity {
    id: u64,
}

impl Identity {
    pub fn new() -> Self {
        Self {
            id: NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn token(&self) -> IdentityToken {
        IdentityToken::Issued(self.id)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.id).finish()
    }
}

/// Types whose instances are identified by an [`IdentityToken`] rather than by value.
pub trait HasIdentity {
    fn identity(&self) -> IdentityToken;
}

impl HasIdentity for Identity {
    fn identity(&self) -> IdentityToken {
        self.token()
    }
}

/// Conversion of a raw argument into its normalized [`Argument`].
///
/// Implementations must not inspect more of an object than needed to obtain
/// its identity. Return [`MemoError::unsupported`] for values that have no
/// stable representation.
///
/// # Examples
///
/// ```
/// use oncely_core::{Argument, MemoArg, MemoError};
///
/// struct UserId(u64);
///
/// impl MemoArg for UserId {
///     fn to_argument(&self) -> Result<Argument, MemoError> {
///         Ok(Argument::Int(self.0 as i128))
///     }
/// }
///
/// assert_eq!(UserId(7).to_argument().unwrap(), Argument::Int(7));
/// ```
pub trait MemoArg {
    fn to_argument(&self) -> Result<Argument, MemoError>;
}

/// Normalizes an argument list, preserving order.
///
/// Fails on the first argument that cannot be normalized; the error carries
/// that argument's position.
///
/// # Examples
///
/// ```
/// use oncely_core::{normalize, Argument};
///
/// let args = normalize(&[&'A', &3u8, &"x"]).unwrap();
/// assert_eq!(
///     args,
///     vec![Argument::Char('A'), Argument::Int(3), Argument::Str("x".into())]
/// );
///
/// let err = normalize(&[&1, &f64::NAN]).unwrap_err();
/// assert!(err.to_string().starts_with("argument #1"));
/// ```
pub fn normalize(args: &[&dyn MemoArg]) -> Result<Vec<Argument>, MemoError> {
    args.iter()
        .enumerate()
        .map(|(position, arg)| arg.to_argument().map_err(|err| err.at_position(position)))
        .collect()
}

macro_rules! impl_memo_arg_int {
    ($($t:ty),*) => {
        $(
            impl MemoArg for $t {
                #[inline]
                fn to_argument(&self) -> Result<Argument, MemoError> {
                    Ok(Argument::Int(*self as i128))
                }
            }
        )*
    };
}

impl_memo_arg_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl MemoArg for u128 {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(match i128::try_from(*self) {
            Ok(v) => Argument::Int(v),
            Err(_) => Argument::Wide(*self),
        })
    }
}

fn float_argument(value: f64) -> Result<Argument, MemoError> {
    if value.is_nan() {
        return Err(MemoError::unsupported("NaN never compares equal to itself"));
    }
    // 0.0 == -0.0, so they must share a key
    let value = if value == 0.0 { 0.0 } else { value };
    Ok(Argument::Float(value.to_bits()))
}

impl MemoArg for f64 {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        float_argument(*self)
    }
}

impl MemoArg for f32 {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        float_argument(f64::from(*self))
    }
}

impl MemoArg for bool {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(Argument::Bool(*self))
    }
}

impl MemoArg for char {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(Argument::Char(*self))
    }
}

impl MemoArg for () {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(Argument::Null)
    }
}

impl MemoArg for str {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(Argument::Str(self.to_owned()))
    }
}

impl MemoArg for String {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(Argument::Str(self.clone()))
    }
}

impl MemoArg for Cow<'_, str> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(Argument::Str(self.as_ref().to_owned()))
    }
}

impl<T: MemoArg + ?Sized> MemoArg for &T {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        (**self).to_argument()
    }
}

impl<T: MemoArg + ?Sized> MemoArg for &mut T {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        (**self).to_argument()
    }
}

impl<T: MemoArg> MemoArg for Option<T> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        match self {
            Some(value) => value.to_argument(),
            None => Ok(Argument::Null),
        }
    }
}

impl<T: MemoArg> MemoArg for [T] {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        self.iter()
            .map(MemoArg::to_argument)
            .collect::<Result<Vec<_>, _>>()
            .map(Argument::List)
    }
}

impl<T: MemoArg, const N: usize> MemoArg for [T; N] {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        self.as_slice().to_argument()
    }
}

impl<T: MemoArg> MemoArg for Vec<T> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        self.as_slice().to_argument()
    }
}

macro_rules! impl_memo_arg_tuple {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: MemoArg),+> MemoArg for ($($name,)+) {
            fn to_argument(&self) -> Result<Argument, MemoError> {
                Ok(Argument::List(vec![$(self.$idx.to_argument()?),+]))
            }
        }
    };
}

impl_memo_arg_tuple!(A 0);
impl_memo_arg_tuple!(A 0, B 1);
impl_memo_arg_tuple!(A 0, B 1, C 2);
impl_memo_arg_tuple!(A 0, B 1, C 2, D 3);

impl MemoArg for Identity {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(Argument::Identity(self.token()))
    }
}

/// Uses an instance's [`HasIdentity`] token as the argument.
pub struct ByIdentity<'a, T: ?Sized>(pub &'a T);

impl<T: HasIdentity + ?Sized> MemoArg for ByIdentity<'_, T> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(Argument::Identity(self.0.identity()))
    }
}

/// Uses the address of a borrowed value as the argument.
///
/// The address only identifies the value while it stays where it is; prefer
/// this for heap-allocated or otherwise pinned values.
pub struct ByAddress<'a, T: ?Sized>(pub &'a T);

impl<T: ?Sized> MemoArg for ByAddress<'_, T> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(address_of(self.0 as *const T))
    }
}

#[inline]
fn address_of<T: ?Sized>(ptr: *const T) -> Argument {
    Argument::Identity(IdentityToken::Address(ptr.cast::<()>() as usize))
}

// Shared pointers and weak references are keyed by the address of their
// allocation. Once every strong reference is dropped the allocator may hand
// that address to a new value, which then matches entries stored for the old
// one. Results keyed this way must not outlive the pointee: keep the pointer
// alive as long as its entries matter, use an instance scope owned by the
// pointee, or give the value an `Identity` and pass it through `ByIdentity`.

/// Keyed by allocation address; see the note above on address reuse.
impl<T: ?Sized> MemoArg for Arc<T> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(address_of(Arc::as_ptr(self)))
    }
}

/// Keyed by allocation address, like `Arc`.
impl<T: ?Sized> MemoArg for Rc<T> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        Ok(address_of(Rc::as_ptr(self)))
    }
}

/// Keyed by the address of the live allocation; a dangling `Weak` is rejected.
impl<T> MemoArg for std::sync::Weak<T> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        if self.strong_count() == 0 {
            return Err(MemoError::unsupported("weak reference to a dropped value"));
        }
        Ok(address_of(self.as_ptr()))
    }
}

impl<T> MemoArg for std::rc::Weak<T> {
    fn to_argument(&self) -> Result<Argument, MemoError> {
        if self.strong_count() == 0 {
            return Err(MemoError::unsupported("weak reference to a dropped value"));
        }
        Ok(address_of(self.as_ptr()))
    }
}
