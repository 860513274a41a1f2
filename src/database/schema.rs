/// Database schema definitions and migrations
///
/// SQL for the shared food cache (with its generated full-text column), the profile
/// table and the plan template catalog.

/// Database schema manager
pub struct DatabaseSchema;

impl DatabaseSchema {
    /// Shared food cache, one row per barcode for all users
    pub fn create_food_cache_table_sql() -> &'static str {
        "
        CREATE TABLE IF NOT EXISTS food_cache (
            barcode TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            brand TEXT,
            calories DOUBLE PRECISION,
            protein DOUBLE PRECISION,
            carbs DOUBLE PRECISION,
            fat DOUBLE PRECISION,
            fiber DOUBLE PRECISION,
            sugar DOUBLE PRECISION,
            sodium DOUBLE PRECISION,
            serving_size TEXT,
            nutriscore_grade TEXT,
            nova_group INTEGER,
            usage_count INTEGER NOT NULL DEFAULT 1,
            last_used_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            cached_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            search_vector tsvector GENERATED ALWAYS AS (
                to_tsvector('simple', coalesce(name, '') || ' ' || coalesce(brand, ''))
            ) STORED
        )
        "
    }

    pub fn create_profiles_table_sql() -> &'static str {
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id UUID PRIMARY KEY,
            display_name TEXT,
            profile_image_url TEXT,
            fitness_level TEXT,
            training_experience_months INTEGER,
            available_training_days SMALLINT,
            primary_goal TEXT,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "
    }

    pub fn create_plan_templates_table_sql() -> &'static str {
        "
        CREATE TABLE IF NOT EXISTS plan_templates (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            fitness_level TEXT,
            days_per_week SMALLINT NOT NULL,
            primary_goal TEXT,
            min_training_experience_months INTEGER NOT NULL DEFAULT 0,
            exercises_per_workout INTEGER,
            estimated_sets_per_week INTEGER,
            completion_status TEXT NOT NULL DEFAULT 'incomplete',
            is_active BOOLEAN NOT NULL DEFAULT true
        )
        "
    }

    /// Indexes for full-text search, top-N usage queries and the active catalog
    pub fn create_indexes_sql() -> Vec<&'static str> {
        vec![
            "CREATE INDEX IF NOT EXISTS idx_food_cache_search ON food_cache USING GIN (search_vector)",
            "CREATE INDEX IF NOT EXISTS idx_food_cache_usage ON food_cache(usage_count DESC)",
            "CREATE INDEX IF NOT EXISTS idx_food_cache_last_used ON food_cache(last_used_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_plan_templates_active ON plan_templates(is_active)",
        ]
    }
}

/// Database migration scripts
pub struct Migrations;

impl Migrations {
    /// Get all migration scripts in order
    pub fn get_all_migrations() -> Vec<Migration> {
        vec![
            Migration {
                version: 1,
                name: "create_food_cache_table",
                up_sql: DatabaseSchema::create_food_cache_table_sql(),
                down_sql: "DROP TABLE IF EXISTS food_cache CASCADE",
            },
            Migration {
                version: 2,
                name: "create_profiles_table",
                up_sql: DatabaseSchema::create_profiles_table_sql(),
                down_sql: "DROP TABLE IF EXISTS profiles CASCADE",
            },
            Migration {
                version: 3,
                name: "create_plan_templates_table",
                up_sql: DatabaseSchema::create_plan_templates_table_sql(),
                down_sql: "DROP TABLE IF EXISTS plan_templates CASCADE",
            },
            Migration {
                version: 4,
                name: "create_indexes",
                up_sql: "CREATE INDEX IF NOT EXISTS idx_food_cache_search ON food_cache USING GIN (search_vector);
                         CREATE INDEX IF NOT EXISTS idx_food_cache_usage ON food_cache(usage_count DESC);
                         CREATE INDEX IF NOT EXISTS idx_food_cache_last_used ON food_cache(last_used_at DESC);
                         CREATE INDEX IF NOT EXISTS idx_plan_templates_active ON plan_templates(is_active);",
                down_sql: "
                    DROP INDEX IF EXISTS idx_food_cache_search;
                    DROP INDEX IF EXISTS idx_food_cache_usage;
                    DROP INDEX IF EXISTS idx_food_cache_last_used;
                    DROP INDEX IF EXISTS idx_plan_templates_active;
                ",
            },
        ]
    }
}

/// Database migration definition
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}
