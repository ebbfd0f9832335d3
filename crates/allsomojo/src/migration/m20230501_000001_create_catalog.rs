//! Initial migration: the `repos` catalog and its `repo_queries` provenance table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_repos(manager).await?;
        self.create_repo_queries(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RepoQueries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Repos::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_repos(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Repos::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Repos::FullName)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    // Hosting metadata
                    .col(ColumnDef::new(Repos::RepoName).string().not_null())
                    .col(ColumnDef::new(Repos::Username).string().not_null())
                    .col(
                        ColumnDef::new(Repos::Fork)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Repos::UserType).string().null())
                    .col(ColumnDef::new(Repos::UserAvatarUrl).text().null())
                    .col(ColumnDef::new(Repos::Description).text().null())
                    .col(ColumnDef::new(Repos::Forks).integer().null())
                    .col(
                        ColumnDef::new(Repos::CreatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repos::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repos::PushedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Repos::CloneUrl).text().null())
                    .col(ColumnDef::new(Repos::Homepage).text().null())
                    .col(ColumnDef::new(Repos::Size).big_integer().null())
                    .col(ColumnDef::new(Repos::StargazersCount).integer().null())
                    .col(ColumnDef::new(Repos::Watchers).integer().null())
                    .col(ColumnDef::new(Repos::Language).string().null())
                    .col(ColumnDef::new(Repos::OpenIssues).integer().null())
                    .col(ColumnDef::new(Repos::License).string().null())
                    .col(
                        ColumnDef::new(Repos::Topics)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    // Mirror statistics
                    .col(ColumnDef::new(Repos::Commits).integer().null())
                    .col(ColumnDef::new(Repos::NMojoFiles).integer().null())
                    .col(ColumnDef::new(Repos::NPythonFiles).integer().null())
                    .col(ColumnDef::new(Repos::NNotebookFiles).integer().null())
                    .col(ColumnDef::new(Repos::NCodeLines).big_integer().null())
                    .col(ColumnDef::new(Repos::LinesAdded30d).big_integer().null())
                    .col(ColumnDef::new(Repos::LinesDeleted30d).big_integer().null())
                    .col(ColumnDef::new(Repos::FilesChanged30d).integer().null())
                    // Mirror
                    .col(ColumnDef::new(Repos::LocalPath).text().null())
                    .col(
                        ColumnDef::new(Repos::LastPulledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    // Crawl bookkeeping
                    .col(
                        ColumnDef::new(Repos::FirstCrawledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Repos::LastCrawledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Repos::NCrawls)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    // Curation
                    .col(ColumnDef::new(Repos::BlacklistedReason).string().null())
                    .col(
                        ColumnDef::new(Repos::ManuallyChecked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        // Watermark lookup and the stats update both filter on these.
        manager
            .create_index(
                Index::create()
                    .name("idx_repos_updated_at")
                    .table(Repos::Table)
                    .col(Repos::UpdatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repos_local_path")
                    .table(Repos::Table)
                    .col(Repos::LocalPath)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_repo_queries(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RepoQueries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RepoQueries::FullName).string().not_null())
                    .col(ColumnDef::new(RepoQueries::Query).text().not_null())
                    .primary_key(
                        Index::create()
                            .col(RepoQueries::FullName)
                            .col(RepoQueries::Query),
                    )
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Repos {
    Table,
    FullName,
    RepoName,
    Username,
    Fork,
    UserType,
    UserAvatarUrl,
    Description,
    Forks,
    CreatedAt,
    UpdatedAt,
    PushedAt,
    CloneUrl,
    Homepage,
    Size,
    StargazersCount,
    Watchers,
    Language,
    OpenIssues,
    License,
    Topics,
    Commits,
    #[sea_orm(iden = "n_mojo_files")]
    NMojoFiles,
    #[sea_orm(iden = "n_python_files")]
    NPythonFiles,
    #[sea_orm(iden = "n_notebook_files")]
    NNotebookFiles,
    #[sea_orm(iden = "n_code_lines")]
    NCodeLines,
    #[sea_orm(iden = "lines_added_30d")]
    LinesAdded30d,
    #[sea_orm(iden = "lines_deleted_30d")]
    LinesDeleted30d,
    #[sea_orm(iden = "files_changed_30d")]
    FilesChanged30d,
    LocalPath,
    LastPulledAt,
    FirstCrawledAt,
    LastCrawledAt,
    #[sea_orm(iden = "n_crawls")]
    NCrawls,
    BlacklistedReason,
    ManuallyChecked,
}

#[derive(DeriveIden)]
enum RepoQueries {
    Table,
    FullName,
    Query,
}
