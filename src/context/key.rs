use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Name of a slot in a [`TypedContext`](super::TypedContext).
///
/// `V` only exists at compile time; two keys with the same name address the
/// same slot whatever their value type, so key names must be unique per
/// value type across the crate and its handlers.
pub struct Key<V> {
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Key<V> {
    /// Panics at compile time when used in a `const` with a blank name.
    pub const fn new(name: &'static str) -> Self {
        assert!(!is_blank(name), "context key name must not be blank");
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

const fn is_blank(name: &str) -> bool {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let (code, width) = if lead < 0x80 {
            (lead as u32, 1)
        } else if lead < 0xE0 {
            (((lead as u32) & 0x1F) << 6 | (bytes[i + 1] as u32 & 0x3F), 2)
        } else if lead < 0xF0 {
            (
                ((lead as u32) & 0x0F) << 12
                    | (bytes[i + 1] as u32 & 0x3F) << 6
                    | (bytes[i + 2] as u32 & 0x3F),
                3,
            )
        } else {
            // nothing above the BMP is whitespace
            return false;
        };
        if !is_whitespace(code) {
            return false;
        }
        i += width;
    }
    true
}

/// Unicode `White_Space` code points, as accepted by [`char::is_whitespace`].
const fn is_whitespace(code: u32) -> bool {
    matches!(
        code,
        0x09..=0x0D
            | 0x20
            | 0x85
            | 0xA0
            | 0x1680
            | 0x2000..=0x200A
            | 0x2028
            | 0x2029
            | 0x202F
            | 0x205F
            | 0x3000
    )
}

impl<V> Clone for Key<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Key<V> {}

impl<V> PartialEq for Key<V> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<V> Eq for Key<V> {}

impl<V> Hash for Key<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<V> fmt::Debug for Key<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?}: {})", self.name, std::any::type_name::<V>())
    }
}
