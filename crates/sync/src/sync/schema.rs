use glam::{Quat, Vec3};

use crate::bits::{CodecError, Stream};

/// Declared wire range of one replicated field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRange {
    Bool,
    Int { min: i64, max: i64 },
    /// Applied per component for vector and quaternion fields.
    Float { min: f32, max: f32, resolution: f32 },
}

impl FieldRange {
    pub const fn int(min: i64, max: i64) -> Self {
        Self::Int { min, max }
    }

    pub const fn float(min: f32, max: f32, resolution: f32) -> Self {
        Self::Float {
            min,
            max,
            resolution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub range: FieldRange,
}

/// A value that can travel through a [`Stream`] under a declared range.
pub trait Field {
    fn serialize_field<S: Stream>(
        &mut self,
        stream: &mut S,
        name: &'static str,
        range: FieldRange,
    ) -> Result<(), CodecError>;
}

/// A component with a fixed field schema and one serialize path for both
/// directions. Implemented through [`replicated!`](crate::replicated).
pub trait Replicated: Default {
    fn schema() -> &'static [FieldSpec];

    fn serialize<S: Stream>(&mut self, stream: &mut S) -> Result<(), CodecError>;
}

/// Declares a replicated component: the struct, its `SCHEMA` table and its
/// [`Replicated`] impl.
///
/// ```
/// use tidewire::replicated;
/// use tidewire::sync::FieldRange;
///
/// replicated! {
///     #[derive(Debug, Clone, Copy, Default, PartialEq)]
///     pub struct Ammo {
///         pub rounds: u8 => FieldRange::int(0, 30),
///         pub reloading: bool => FieldRange::Bool,
///     }
/// }
///
/// assert_eq!(Ammo::SCHEMA[0].name, "rounds");
/// ```
#[macro_export]
macro_rules! replicated {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $fvis:vis $field:ident : $ty:ty => $range:expr ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $fvis $field: $ty ),*
        }

        impl $name {
            pub const SCHEMA: &'static [$crate::sync::FieldSpec] = &[
                $( $crate::sync::FieldSpec { name: stringify!($field), range: $range } ),*
            ];
        }

        impl $crate::sync::Replicated for $name {
            fn schema() -> &'static [$crate::sync::FieldSpec] {
                Self::SCHEMA
            }

            fn serialize<S: $crate::bits::Stream>(
                &mut self,
                stream: &mut S,
            ) -> Result<(), $crate::bits::CodecError> {
                $(
                    $crate::sync::Field::serialize_field(
                        &mut self.$field,
                        stream,
                        stringify!($field),
                        $range,
                    )?;
                )*
                Ok(())
            }
        }
    };
}

impl Field for bool {
    fn serialize_field<S: Stream>(
        &mut self,
        stream: &mut S,
        name: &'static str,
        range: FieldRange,
    ) -> Result<(), CodecError> {
        match range {
            FieldRange::Bool => stream.serialize_bool(self),
            _ => Err(CodecError::SchemaMismatch { field: name }),
        }
    }
}

macro_rules! int_field {
    ($($ty:ty),*) => {
        $(
            impl Field for $ty {
                fn serialize_field<S: Stream>(
                    &mut self,
                    stream: &mut S,
                    name: &'static str,
                    range: FieldRange,
                ) -> Result<(), CodecError> {
                    match range {
                        FieldRange::Int { min, max } => stream.serialize_ranged(self, min, max),
                        _ => Err(CodecError::SchemaMismatch { field: name }),
                    }
                }
            }
        )*
    };
}

int_field!(u8, u16, u32, i8, i16, i32);

impl Field for f32 {
    fn serialize_field<S: Stream>(
        &mut self,
        stream: &mut S,
        name: &'static str,
        range: FieldRange,
    ) -> Result<(), CodecError> {
        match range {
            FieldRange::Float {
                min,
                max,
                resolution,
            } => stream.serialize_float(self, min, max, resolution),
            _ => Err(CodecError::SchemaMismatch { field: name }),
        }
    }
}

impl Field for Vec3 {
    fn serialize_field<S: Stream>(
        &mut self,
        stream: &mut S,
        name: &'static str,
        range: FieldRange,
    ) -> Result<(), CodecError> {
        self.x.serialize_field(stream, name, range)?;
        self.y.serialize_field(stream, name, range)?;
        self.z.serialize_field(stream, name, range)
    }
}

impl Field for Quat {
    fn serialize_field<S: Stream>(
        &mut self,
        stream: &mut S,
        name: &'static str,
        range: FieldRange,
    ) -> Result<(), CodecError> {
        let mut parts = self.to_array();
        for part in &mut parts {
            part.serialize_field(stream, name, range)?;
        }
        if stream.is_reading() {
            let quat = Quat::from_array(parts);
            *self = if quat.length_squared() > f32::EPSILON {
                quat.normalize()
            } else {
                Quat::IDENTITY
            };
        }
        Ok(())
    }
}
