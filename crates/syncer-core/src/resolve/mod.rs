//! Resolve - 値の変換とフィールドマッピング

pub mod mapping;
pub mod resolver;

pub use self::mapping::{FieldMapping, MappingError, MappingGroup, ResolverStage};
pub use self::resolver::{Int, Resolver, ResolverRegistry, Trim};
