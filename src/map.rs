use crate::raw;
use seize::{Collector, Guard, LocalGuard, OwnedGuard};

use std::fmt;

/// A concurrent hash map from positive `i32` keys to positive `i32` values.
///
/// Most operations require a [`Guard`], which can be acquired through
/// [`HashMap::guard`] or using the [`HashMap::pin`] API. See the [crate-level
/// documentation](crate) for more details.
pub struct HashMap {
    raw: raw::HashMap,
}

/// A builder for a [`HashMap`].
///
/// # Examples
///
/// ```rust
/// use kumquat::HashMap;
/// use seize::Collector;
///
/// let map = HashMap::builder()
///     // Use a custom garbage collector.
///     .collector(Collector::new().batch_size(128))
///     // Construct the hash map.
///     .build();
/// ```
pub struct HashMapBuilder {
    collector: Collector,
}

impl HashMapBuilder {
    /// Sets the collector that reclaims superseded generations of the table.
    ///
    /// See [`seize::Collector`] for details.
    pub fn collector(self, collector: Collector) -> Self {
        HashMapBuilder { collector }
    }

    /// Construct a [`HashMap`] from the builder, using the configured options.
    pub fn build(self) -> HashMap {
        HashMap {
            raw: raw::HashMap::new(self.collector),
        }
    }
}

impl fmt::Debug for HashMapBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMapBuilder")
            .field("collector", &self.collector)
            .finish()
    }
}

impl Default for HashMap {
    fn default() -> Self {
        HashMap::new()
    }
}

impl HashMap {
    /// Creates an empty `HashMap`.
    ///
    /// The map starts with a capacity of two keys and grows as keys are
    /// inserted.
    ///
    /// # Examples
    ///
    /// ```
    /// use kumquat::HashMap;
    /// let map = HashMap::new();
    /// ```
    pub fn new() -> HashMap {
        HashMap::builder().build()
    }

    /// Returns a builder for a `HashMap`.
    ///
    /// The builder can be used for more complex configuration, such as using
    /// a custom [`Collector`].
    pub fn builder() -> HashMapBuilder {
        HashMapBuilder {
            collector: Collector::new(),
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// The returned reference manages a guard internally, preventing garbage collection
    /// for as long as it is held. See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn pin(&self) -> HashMapRef<'_, LocalGuard<'_>> {
        HashMapRef {
            guard: self.raw.guard(),
            map: self,
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// Unlike [`HashMap::pin`], the returned reference implements `Send` and `Sync`,
    /// allowing it to be held across `.await` points in work-stealing schedulers.
    ///
    /// The returned reference manages a guard internally, preventing garbage collection
    /// for as long as it is held. See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn pin_owned(&self) -> HashMapRef<'_, OwnedGuard<'_>> {
        HashMapRef {
            guard: self.raw.owned_guard(),
            map: self,
        }
    }

    /// Returns a guard for use with this map.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    /// See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.raw.guard()
    }

    /// Returns an owned guard for use with this map.
    ///
    /// Owned guards implement `Send` and `Sync`, allowing them to be held across
    /// `.await` points in work-stealing schedulers.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    /// See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.raw.owned_guard()
    }

    /// Returns the number of keys in the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use kumquat::HashMap;
    ///
    /// let map = HashMap::new();
    ///
    /// map.pin().put(1, 10).unwrap();
    /// map.pin().put(2, 20).unwrap();
    /// assert!(map.len() == 2);
    /// ```
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kumquat::HashMap;
    ///
    /// let map = HashMap::new();
    /// assert!(map.is_empty());
    /// map.pin().put(1, 10).unwrap();
    /// assert!(!map.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of keys the current generation of the table can hold.
    ///
    /// The capacity starts at two and doubles whenever the table is resized. It
    /// never decreases.
    #[inline]
    pub fn capacity(&self, guard: &impl Guard) -> usize {
        self.raw.verify(guard);
        self.raw.capacity(guard)
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Examples
    ///
    /// ```
    /// use kumquat::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    /// map.put(1, 10, &guard).unwrap();
    /// assert_eq!(map.contains_key(1, &guard), Ok(true));
    /// assert_eq!(map.contains_key(2, &guard), Ok(false));
    /// ```
    #[inline]
    pub fn contains_key(&self, key: i32, guard: &impl Guard) -> Result<bool, Error> {
        self.get(key, guard).map(|value| value.is_some())
    }

    /// Returns the value corresponding to the key.
    ///
    /// Returns an error if the key is not positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use kumquat::{Error, HashMap};
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    /// map.put(1, 10, &guard).unwrap();
    /// assert_eq!(map.get(1, &guard), Ok(Some(10)));
    /// assert_eq!(map.get(2, &guard), Ok(None));
    /// assert_eq!(map.get(0, &guard), Err(Error::InvalidKey(0)));
    /// ```
    #[inline]
    pub fn get(&self, key: i32, guard: &impl Guard) -> Result<Option<i32>, Error> {
        self.raw.verify(guard);
        check_key(key)?;
        Ok(self.raw.get(key, guard))
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map did not have this key present, [`None`] is returned. Otherwise,
    /// the value is updated and the old value is returned.
    ///
    /// Returns an error, without modifying the map, if the key or value is not positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use kumquat::{Error, HashMap};
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    /// assert_eq!(map.put(37, 1, &guard), Ok(None));
    /// assert_eq!(map.put(37, 2, &guard), Ok(Some(1)));
    /// assert_eq!(map.put(37, -1, &guard), Err(Error::InvalidValue(-1)));
    /// assert_eq!(map.get(37, &guard), Ok(Some(2)));
    /// ```
    #[inline]
    pub fn put(&self, key: i32, value: i32, guard: &impl Guard) -> Result<Option<i32>, Error> {
        self.raw.verify(guard);
        check_key(key)?;
        check_value(value)?;
        Ok(self.raw.put(key, value, guard))
    }

    /// Removes a key from the map, returning the value at the key if the key
    /// was previously in the map.
    ///
    /// Returns an error if the key is not positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use kumquat::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    /// map.put(1, 10, &guard).unwrap();
    /// assert_eq!(map.remove(1, &guard), Ok(Some(10)));
    /// assert_eq!(map.remove(1, &guard), Ok(None));
    /// ```
    #[inline]
    pub fn remove(&self, key: i32, guard: &impl Guard) -> Result<Option<i32>, Error> {
        self.raw.verify(guard);
        check_key(key)?;
        Ok(self.raw.remove(key, guard))
    }
}

impl fmt::Debug for HashMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.guard();

        f.debug_struct("HashMap")
            .field("len", &self.len())
            .field("capacity", &self.raw.capacity(&guard))
            .finish()
    }
}

/// A pinned reference to a [`HashMap`].
///
/// This type is created with [`HashMap::pin`] and can be used to easily access a [`HashMap`]
/// without explicitly managing a guard. See the [crate-level documentation](crate#usage) for details.
pub struct HashMapRef<'map, G> {
    guard: G,
    map: &'map HashMap,
}

impl<'map, G> HashMapRef<'map, G>
where
    G: Guard,
{
    /// Returns a reference to the inner [`HashMap`].
    #[inline]
    pub fn map(&self) -> &'map HashMap {
        self.map
    }

    /// Returns the number of keys in the map.
    ///
    /// See [`HashMap::len`] for details.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.raw.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    ///
    /// See [`HashMap::is_empty`] for details.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the capacity of the current generation of the table.
    ///
    /// See [`HashMap::capacity`] for details.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.map.raw.capacity(&self.guard)
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// See [`HashMap::contains_key`] for details.
    #[inline]
    pub fn contains_key(&self, key: i32) -> Result<bool, Error> {
        self.get(key).map(|value| value.is_some())
    }

    /// Returns the value corresponding to the key.
    ///
    /// See [`HashMap::get`] for details.
    #[inline]
    pub fn get(&self, key: i32) -> Result<Option<i32>, Error> {
        check_key(key)?;
        Ok(self.map.raw.get(key, &self.guard))
    }

    /// Inserts a key-value pair into the map.
    ///
    /// See [`HashMap::put`] for details.
    #[inline]
    pub fn put(&self, key: i32, value: i32) -> Result<Option<i32>, Error> {
        check_key(key)?;
        check_value(value)?;
        Ok(self.map.raw.put(key, value, &self.guard))
    }

    /// Removes a key from the map, returning the value at the key if the key
    /// was previously in the map.
    ///
    /// See [`HashMap::remove`] for details.
    #[inline]
    pub fn remove(&self, key: i32) -> Result<Option<i32>, Error> {
        check_key(key)?;
        Ok(self.map.raw.remove(key, &self.guard))
    }
}

impl<G> fmt::Debug for HashMapRef<'_, G>
where
    G: Guard,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMapRef")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// An error returned for arguments outside of the map's domain.
///
/// These errors are raised before the map is touched, so a failed call never
/// has a partial effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The key was zero or negative.
    InvalidKey(i32),

    /// The value was zero or negative.
    InvalidValue(i32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidKey(key) => write!(f, "key must be positive: {key}"),
            Error::InvalidValue(value) => write!(f, "value must be positive: {value}"),
        }
    }
}

impl std::error::Error for Error {}

#[inline]
fn check_key(key: i32) -> Result<(), Error> {
    if key <= 0 {
        return Err(Error::InvalidKey(key));
    }

    Ok(())
}

#[inline]
fn check_value(value: i32) -> Result<(), Error> {
    if value <= 0 {
        return Err(Error::InvalidValue(value));
    }

    Ok(())
}
