//! Table descriptions and the DDL rendered from them.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
}

impl ColumnDef {
    pub const fn required(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
        }
    }

    pub const fn optional(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<&'static str>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDef {
    pub fn create_statement(&self) -> String {
        let mut parts = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "NULL" } else { "NOT NULL" };
                format!("    {} {} {}", c.name, c.sql_type, null)
            })
            .collect::<Vec<_>>();

        parts.push(format!(
            "    CONSTRAINT pk_{}_{} PRIMARY KEY ({})",
            self.name,
            self.primary_key.join("_"),
            self.primary_key.join(", ")
        ));
        for fk in &self.foreign_keys {
            parts.push(format!(
                "    CONSTRAINT fk_{}_{} FOREIGN KEY ({}) REFERENCES {} ({})",
                self.name, fk.column, fk.column, fk.references_table, fk.references_column
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.name,
            parts.join(",\n")
        )
    }

    /// Backfill statements for tables created by an older schema.
    ///
    /// Added columns are left nullable: existing rows have no value for them.
    pub fn add_column_statements(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !self.primary_key.contains(&c.name))
            .map(|c| {
                format!(
                    "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                    self.name, c.name, c.sql_type
                )
            })
            .collect()
    }
}

/// Full set of tables, in foreign-key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub tables: Vec<TableDef>,
}

impl Schema {
    pub fn drops() -> Self {
        let games = TableDef {
            name: "games",
            columns: vec![
                ColumnDef::required("id", "INTEGER"),
                ColumnDef::required("name", "VARCHAR(255)"),
                ColumnDef::optional("box_art_url", "TEXT"),
            ],
            primary_key: vec!["id"],
            foreign_keys: vec![],
        };

        let drops = TableDef {
            name: "drops",
            columns: vec![
                ColumnDef::required("id", "VARCHAR(40)"),
                ColumnDef::required("name", "VARCHAR(255)"),
                ColumnDef::required("game_id", "INTEGER"),
                ColumnDef::required("started", "TIMESTAMP"),
                ColumnDef::required("ended", "TIMESTAMP"),
                ColumnDef::required("status", "VARCHAR(20)"),
            ],
            primary_key: vec!["id"],
            foreign_keys: vec![ForeignKey {
                column: "game_id",
                references_table: "games",
                references_column: "id",
            }],
        };

        let benefits = TableDef {
            name: "dropbenefits",
            columns: vec![
                ColumnDef::required("id", "VARCHAR(40)"),
                ColumnDef::required("name", "VARCHAR(255)"),
                ColumnDef::required("drop_id", "VARCHAR(40)"),
                ColumnDef::required("required_minutes_watched", "INTEGER"),
                ColumnDef::required("entitlement_limit", "INTEGER"),
                ColumnDef::optional("benefit_art_url", "TEXT"),
            ],
            primary_key: vec!["id"],
            foreign_keys: vec![ForeignKey {
                column: "drop_id",
                references_table: "drops",
                references_column: "id",
            }],
        };

        let prereqs = TableDef {
            name: "dropbenefitprereqs",
            columns: vec![
                ColumnDef::required("benefit_id", "VARCHAR(40)"),
                ColumnDef::required("pre_req_benefit_id", "VARCHAR(40)"),
            ],
            primary_key: vec!["benefit_id", "pre_req_benefit_id"],
            foreign_keys: vec![
                ForeignKey {
                    column: "benefit_id",
                    references_table: "dropbenefits",
                    references_column: "id",
                },
                ForeignKey {
                    column: "pre_req_benefit_id",
                    references_table: "dropbenefits",
                    references_column: "id",
                },
            ],
        };

        Self {
            tables: vec![games, drops, benefits, prereqs],
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Every statement `ensure_schema` runs, in order.
    pub fn statements(&self) -> Vec<String> {
        let mut out = Vec::new();
        for table in &self.tables {
            out.push(table.create_statement());
            out.extend(table.add_column_statements());
        }
        out
    }
}
