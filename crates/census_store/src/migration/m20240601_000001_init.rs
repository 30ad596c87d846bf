use sea_orm_migration::prelude::*;

use crate::db::{Citizens, Imports, Relatives};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Imports::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Imports::ImportId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Imports::CreatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Citizens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Citizens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Citizens::ImportId).integer().not_null())
                    .col(ColumnDef::new(Citizens::CitizenId).big_integer().not_null())
                    .col(ColumnDef::new(Citizens::Town).string().not_null())
                    .col(ColumnDef::new(Citizens::Street).string().not_null())
                    .col(ColumnDef::new(Citizens::Building).string().not_null())
                    .col(ColumnDef::new(Citizens::Apartment).big_integer().not_null())
                    .col(ColumnDef::new(Citizens::Name).string().not_null())
                    .col(ColumnDef::new(Citizens::BirthDate).date().not_null())
                    .col(ColumnDef::new(Citizens::Gender).string_len(6).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_citizens_import")
                            .from(Citizens::Table, Citizens::ImportId)
                            .to(Imports::Table, Imports::ImportId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uk_citizens_import_citizen")
                    .table(Citizens::Table)
                    .col(Citizens::ImportId)
                    .col(Citizens::CitizenId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_citizens_import_town")
                    .table(Citizens::Table)
                    .col(Citizens::ImportId)
                    .col(Citizens::Town)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Relatives::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Relatives::Id1).integer().not_null())
                    .col(ColumnDef::new(Relatives::Id2).integer().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_relatives")
                            .col(Relatives::Id1)
                            .col(Relatives::Id2),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relatives_id1")
                            .from(Relatives::Table, Relatives::Id1)
                            .to(Citizens::Table, Citizens::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relatives_id2")
                            .from(Relatives::Table, Relatives::Id2)
                            .to(Citizens::Table, Citizens::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_relatives_id2")
                    .table(Relatives::Table)
                    .col(Relatives::Id2)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Relatives::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Citizens::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Imports::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
