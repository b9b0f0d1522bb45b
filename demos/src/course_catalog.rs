//! Course catalog walkthrough: migrations, CRUD, filtered queries, export.
//!
//! Runs against an in-memory database unless `--config` names a YAML
//! [`DbConfig`] file. Set `RUST_LOG=debug` to see every statement.

use std::path::PathBuf;

use clap::Parser;
use tinyorm_core::{
    Attributes, ColumnSpec, ConversionError, Criteria, Direction, Entity, EntitySchema,
    MetadataRegistry,
};
use tinyorm_sqlite::{
    DbConfig, Migration, MigrationManager, Repository, Result, Session, SqlMigration,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "course_catalog")]
#[command(about = "Walk through tinyorm repositories and migrations")]
struct Cli {
    /// YAML connection settings; defaults to an in-memory database.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drop and re-create the courses table before seeding.
    #[arg(long)]
    reset: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Course {
    id: Option<i64>,
    name: String,
    department: String,
}

impl Course {
    fn new(name: &str, department: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            department: department.to_string(),
        }
    }
}

impl Entity for Course {
    type Id = i64;

    fn schema() -> EntitySchema {
        EntitySchema::new("courses")
            .column(ColumnSpec::id("id", "INTEGER").auto_increment())
            .column(ColumnSpec::new("name", "VARCHAR").not_null())
            .column(ColumnSpec::new("department", "VARCHAR").not_null())
    }

    fn to_attributes(&self) -> Attributes {
        Attributes::new()
            .with("id", self.id)
            .with("name", &self.name)
            .with("department", &self.department)
    }

    fn from_attributes(attrs: &Attributes) -> std::result::Result<Self, ConversionError> {
        Ok(Self {
            id: attrs.get("id")?,
            name: attrs.get("name")?,
            department: attrs.get("department")?,
        })
    }
}

/// Course-specific queries on top of the generic repository.
struct CourseRepository<'s, S: Session> {
    inner: Repository<'s, Course, S>,
}

impl<'s, S: Session> CourseRepository<'s, S> {
    fn new(session: &'s S, registry: &MetadataRegistry) -> Result<Self> {
        Ok(Self {
            inner: Repository::new(session, registry)?,
        })
    }

    fn find_by_department(&self, department: &str) -> Result<Vec<Course>> {
        self.inner
            .find_by(&Criteria::new().eq("department", department))
    }

    fn newest(&self, limit: u64) -> Result<Vec<Course>> {
        let query = self
            .inner
            .query()
            .order_by("id", Direction::Desc)
            .limit(limit);
        self.inner.execute_query(&query)
    }
}

fn migrations() -> Vec<SqlMigration> {
    vec![
        SqlMigration::new(
            "create_departments",
            "1.0.0",
            "CREATE TABLE IF NOT EXISTS departments (code VARCHAR PRIMARY KEY, title VARCHAR NOT NULL);
             INSERT OR IGNORE INTO departments VALUES ('CS', 'Computer Science'), ('MATH', 'Mathematics');",
            "DROP TABLE IF EXISTS departments;",
        ),
        SqlMigration::new(
            "index_course_department",
            "1.1.0",
            "CREATE INDEX IF NOT EXISTS idx_courses_department ON courses (department);",
            "DROP INDEX IF EXISTS idx_courses_department;",
        ),
    ]
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => DbConfig::load(path)?,
        None => DbConfig::memory("mydb"),
    };
    let session = config.open()?;
    let registry = MetadataRegistry::new();

    let courses = CourseRepository::new(&session, &registry)?;
    courses.inner.init(cli.reset)?;

    let manager = MigrationManager::new(&session);
    manager.init()?;
    let migrations = migrations();
    let list: Vec<&dyn Migration> = migrations.iter().map(|m| m as &dyn Migration).collect();
    info!(pending = ?manager.pending(&list)?, "checking migrations");
    let applied = manager.apply_migrations(&list)?;
    info!(applied, "migrations up to date");

    let mut python = courses
        .inner
        .save(Course::new("Python Programming", "CS"))?;
    courses.inner.save(Course::new("Linear Algebra", "MATH"))?;
    courses.inner.save(Course::new("Databases", "CS"))?;
    info!(id = ?python.id, "saved course");

    let all = courses.inner.find_all()?;
    let cs = courses.find_by_department("CS")?;
    info!(total = all.len(), cs = cs.len(), "loaded courses");

    python.name = "Advanced Python".to_string();
    courses.inner.save(python.clone())?;
    for course in courses.newest(2)? {
        info!(id = ?course.id, name = %course.name, "recent course");
    }

    courses.inner.remove(&python)?;
    info!(remaining = courses.inner.count()?, "removed course");

    println!("{}", courses.inner.to_json()?);

    for record in manager.get_applied_migrations()? {
        info!(
            name = %record.name,
            version = %record.version,
            applied_at = %record.applied_at,
            "applied migration"
        );
    }

    session.close()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
