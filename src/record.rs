//! Fixed-shape records and their partial patches.

use crate::error::Result;

/// A flat record of named fields whose shape never changes.
///
/// Implemented by structs declared with [`record!`](crate::record) and by
/// [`JsonRecord`](crate::JsonRecord).
pub trait Record: Clone + PartialEq + Send + Sync + 'static {
    /// Subset of the record's fields carrying new values.
    type Patch: Default + Send + 'static;

    /// Overwrite every field present in `patch`, leaving the rest untouched.
    ///
    /// On error the record must be left as it was.
    fn apply_patch(&mut self, patch: Self::Patch) -> Result<()>;

    /// Names of the fields whose values differ between `self` and `other`.
    fn diff(&self, other: &Self) -> Vec<String>;
}

/// Declare a record struct together with its patch struct.
///
/// The patch has one `Option` per field and a chainable setter named after
/// each field. Field types must implement `Clone`, `Debug` and `PartialEq`.
///
/// ```ignore
/// object_state::record! {
///     #[derive(Clone, Debug, PartialEq)]
///     pub struct Counter patch CounterPatch {
///         pub count: i64,
///         pub label: String,
///     }
/// }
///
/// let patch = CounterPatch::default().count(10);
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident patch $patch:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $ty, )*
        }

        #[doc = concat!("Partial record of [`", stringify!($name), "`].")]
        #[derive(Clone, Debug, Default)]
        $vis struct $patch {
            $( pub $field: ::core::option::Option<$ty>, )*
        }

        #[allow(dead_code)]
        impl $patch {
            $(
                #[doc = concat!("Set `", stringify!($field), "` in this patch.")]
                pub fn $field(mut self, value: $ty) -> Self {
                    self.$field = ::core::option::Option::Some(value);
                    self
                }
            )*

            /// True when no field is set.
            pub fn is_empty(&self) -> bool {
                true $( && self.$field.is_none() )*
            }
        }

        impl $crate::Record for $name {
            type Patch = $patch;

            fn apply_patch(&mut self, patch: Self::Patch) -> $crate::Result<()> {
                $(
                    if let ::core::option::Option::Some(value) = patch.$field {
                        self.$field = value;
                    }
                )*
                ::core::result::Result::Ok(())
            }

            fn diff(&self, other: &Self) -> ::std::vec::Vec<::std::string::String> {
                #[allow(unused_mut)]
                let mut changed = ::std::vec::Vec::new();
                $(
                    if self.$field != other.$field {
                        changed.push(::std::string::String::from(stringify!($field)));
                    }
                )*
                changed
            }
        }
    };
}

/// Build a [`Field`](crate::Field) lens for `record.field`.
#[macro_export]
macro_rules! field {
    ($record:ty, $field:ident) => {
        $crate::Field::new(
            stringify!($field),
            |record: &$record| &record.$field,
            |record: &mut $record| &mut record.$field,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::record! {
        #[derive(Clone, Debug, PartialEq)]
        struct Profile patch ProfilePatch {
            name: String,
            age: u32,
            active: bool,
        }
    }

    fn profile() -> Profile {
        Profile {
            name: "ada".to_string(),
            age: 36,
            active: true,
        }
    }

    #[test]
    fn test_apply_patch_only_touches_present_fields() {
        let mut p = profile();
        p.apply_patch(ProfilePatch::default().age(37)).unwrap();

        assert_eq!(p.age, 37);
        assert_eq!(p.name, "ada");
        assert!(p.active);
    }

    #[test]
    fn test_empty_patch() {
        let patch = ProfilePatch::default();
        assert!(patch.is_empty());

        let mut p = profile();
        p.apply_patch(patch).unwrap();
        assert_eq!(p, profile());
    }

    #[test]
    fn test_diff_lists_changed_fields() {
        let a = profile();
        let mut b = profile();
        b.name = "grace".to_string();
        b.active = false;

        assert_eq!(a.diff(&b), vec!["name".to_string(), "active".to_string()]);
        assert!(a.diff(&a.clone()).is_empty());
    }

    #[test]
    fn test_field_lens() {
        let age = crate::field!(Profile, age);
        let mut p = profile();

        assert_eq!(age.name(), "age");
        assert_eq!(*age.get(&p), 36);
        *age.get_mut(&mut p) = 40;
        assert_eq!(p.age, 40);
    }
}
