mod entity;
mod field;
mod ty;

pub(crate) use entity::ParsedEntity;
