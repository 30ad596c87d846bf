use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum Imports {
    Table,
    ImportId,
    CreatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Citizens {
    Table,
    Id,
    ImportId,
    CitizenId,
    Town,
    Street,
    Building,
    Apartment,
    Name,
    BirthDate,
    Gender,
}

/// One row per undirected edge, stored with `id1 < id2`.
#[derive(Iden, Clone, Copy)]
pub enum Relatives {
    Table,
    Id1,
    Id2,
}
