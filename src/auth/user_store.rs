//! User Storage
//! Mission: Persist users, groups and permissions with SQLite

use crate::auth::models::{Group, Permission, User, UserType};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, is_active, is_staff, is_superuser, \
     user_typ, user_code, date_joined, last_login";

const PERMISSION_COLUMNS: &str = "p.id, p.name, p.app_label, p.model, p.codename";

/// Content types whose add/change/delete/view permissions exist from the start
const DEFAULT_CONTENT_TYPES: [(&str, &str); 3] = [
    ("users", "user"),
    ("auth", "group"),
    ("auth", "permission"),
];

const DEFAULT_ACTIONS: [&str; 4] = ["add", "change", "delete", "view"];

/// User storage with SQLite backend
pub struct UserStore {
    conn: Mutex<Connection>,
}

impl UserStore {
    /// Open (or create) the database at `db_path` and initialize the schema
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open auth database at {db_path}"))?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and one-off tooling
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_db()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL COLLATE NOCASE UNIQUE,
                password_hash TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_staff INTEGER NOT NULL DEFAULT 0,
                is_superuser INTEGER NOT NULL DEFAULT 0,
                user_typ TEXT NOT NULL DEFAULT 'ADMIN',
                user_code TEXT,
                date_joined TEXT NOT NULL,
                last_login TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_users_code_active ON users (user_code, is_active);

            CREATE TABLE IF NOT EXISTS auth_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS auth_permissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                app_label TEXT NOT NULL,
                model TEXT NOT NULL,
                codename TEXT NOT NULL,
                UNIQUE (app_label, model, codename)
            );

            CREATE TABLE IF NOT EXISTS auth_group_permissions (
                group_id INTEGER NOT NULL REFERENCES auth_groups(id) ON DELETE CASCADE,
                permission_id INTEGER NOT NULL REFERENCES auth_permissions(id) ON DELETE CASCADE,
                PRIMARY KEY (group_id, permission_id)
            );

            CREATE TABLE IF NOT EXISTS user_groups (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                group_id INTEGER NOT NULL REFERENCES auth_groups(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, group_id)
            );

            CREATE TABLE IF NOT EXISTS user_permissions (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                permission_id INTEGER NOT NULL REFERENCES auth_permissions(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, permission_id)
            );",
        )
        .context("Failed to initialize auth schema")?;

        Self::create_default_permissions(&conn)?;

        Ok(())
    }

    /// Register the standard model permissions if they are missing
    fn create_default_permissions(conn: &Connection) -> Result<()> {
        let mut inserted = 0;
        for (app_label, model) in DEFAULT_CONTENT_TYPES {
            for action in DEFAULT_ACTIONS {
                inserted += conn
                    .execute(
                        "INSERT OR IGNORE INTO auth_permissions (name, app_label, model, codename)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            format!("Can {action} {model}"),
                            app_label,
                            model,
                            format!("{action}_{model}"),
                        ],
                    )
                    .context("Failed to insert default permission")?;
            }
        }

        if inserted > 0 {
            info!("🔐 Registered {} default permissions", inserted);
        }
        Ok(())
    }

    // ---------------------------------------------------------------- users

    /// Insert a new user row
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.insert_user_with_relations(user, &[], &[])
    }

    /// Insert a user together with its memberships; nothing is kept if any link fails
    pub fn insert_user_with_relations(
        &self,
        user: &User,
        group_ids: &[i64],
        permission_ids: &[i64],
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO users (id, email, password_hash, is_active, is_staff, is_superuser,
                                user_typ, user_code, date_joined, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.id.to_string(),
                user.email,
                user.password_hash,
                user.is_active,
                user.is_staff,
                user.is_superuser,
                user.user_typ.as_str(),
                user.user_code,
                user.date_joined.to_rfc3339(),
                user.last_login.map(|t| t.to_rfc3339()),
            ],
        )
        .context("Failed to insert user")?;
        link_groups(&tx, &user.id, group_ids)?;
        link_permissions(&tx, &user.id, permission_ids)?;
        tx.commit()?;
        Ok(())
    }

    /// Persist every mutable column except the password hash
    pub fn update_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users
                 SET email = ?2, is_active = ?3, is_staff = ?4, is_superuser = ?5,
                     user_typ = ?6, user_code = ?7, last_login = ?8
                 WHERE id = ?1",
                params![
                    user.id.to_string(),
                    user.email,
                    user.is_active,
                    user.is_staff,
                    user.is_superuser,
                    user.user_typ.as_str(),
                    user.user_code,
                    user.last_login.map(|t| t.to_rfc3339()),
                ],
            )
            .context("Failed to update user")?;

        if rows == 0 {
            anyhow::bail!("User not found");
        }
        Ok(())
    }

    pub fn set_password_hash(&self, user_id: &Uuid, password_hash: &str) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                params![user_id.to_string(), password_hash],
            )
            .context("Failed to store password hash")?;

        if rows == 0 {
            anyhow::bail!("User not found");
        }
        Ok(())
    }

    /// Get user by ID
    pub fn get_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
        let user = stmt
            .query_row(params![user_id.to_string()], user_from_row)
            .optional()?;
        Ok(user)
    }

    /// Get user by email (case-insensitive)
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))?;

        match stmt.query_row(params![email], user_from_row) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether another account already uses `email`
    pub fn email_taken(&self, email: &str, excluding: Option<&Uuid>) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1 AND id != ?2",
            params![email, excluding.map(|id| id.to_string()).unwrap_or_default()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether an active user currently holds `code`
    pub fn active_user_code_exists(&self, code: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE is_active = 1 AND user_code = ?1)",
            params![code],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// List all users, oldest first
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY date_joined, email"
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Replace the user's group memberships
    pub fn set_user_groups(&self, user_id: &Uuid, group_ids: &[i64]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM user_groups WHERE user_id = ?1",
            params![user_id.to_string()],
        )?;
        link_groups(&tx, user_id, group_ids)?;
        tx.commit()?;

        debug!("User {} now in {} groups", user_id, group_ids.len());
        Ok(())
    }

    /// Replace the user's directly assigned permissions
    pub fn set_user_permissions(&self, user_id: &Uuid, permission_ids: &[i64]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM user_permissions WHERE user_id = ?1",
            params![user_id.to_string()],
        )?;
        link_permissions(&tx, user_id, permission_ids)?;
        tx.commit()?;

        debug!(
            "User {} now holds {} direct permissions",
            user_id,
            permission_ids.len()
        );
        Ok(())
    }

    pub fn user_groups(&self, user_id: &Uuid) -> Result<Vec<Group>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT g.id, g.name FROM auth_groups g
             JOIN user_groups ug ON ug.group_id = g.id
             WHERE ug.user_id = ?1
             ORDER BY g.id",
        )?;
        let groups = stmt
            .query_map(params![user_id.to_string()], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    pub fn user_permissions(&self, user_id: &Uuid) -> Result<Vec<Permission>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM auth_permissions p
             JOIN user_permissions up ON up.permission_id = p.id
             WHERE up.user_id = ?1
             ORDER BY p.id"
        ))?;
        let permissions = stmt
            .query_map(params![user_id.to_string()], permission_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(permissions)
    }

    // --------------------------------------------------------------- groups

    pub fn create_group(&self, name: &str) -> Result<Group> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO auth_groups (name) VALUES (?1)", params![name])
            .context("Failed to insert group")?;

        let group = Group {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        };
        info!("✅ Created group: {} ({})", group.name, group.id);
        Ok(group)
    }

    pub fn rename_group(&self, group_id: i64, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE auth_groups SET name = ?2 WHERE id = ?1",
                params![group_id, name],
            )
            .context("Failed to rename group")?;

        if rows == 0 {
            anyhow::bail!("Group not found");
        }
        Ok(())
    }

    pub fn get_group(&self, group_id: i64) -> Result<Option<Group>> {
        let conn = self.conn.lock();
        let group = conn
            .query_row(
                "SELECT id, name FROM auth_groups WHERE id = ?1",
                params![group_id],
                group_from_row,
            )
            .optional()?;
        Ok(group)
    }

    pub fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let conn = self.conn.lock();
        let group = conn
            .query_row(
                "SELECT id, name FROM auth_groups WHERE name = ?1",
                params![name],
                group_from_row,
            )
            .optional()?;
        Ok(group)
    }

    /// Whether another group already uses `name`
    pub fn group_name_taken(&self, name: &str, excluding: Option<i64>) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM auth_groups WHERE name = ?1 AND id != ?2",
            params![name, excluding.unwrap_or(0)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, name FROM auth_groups ORDER BY id")?;
        let groups = stmt
            .query_map([], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Replace the permission set of a group
    pub fn set_group_permissions(&self, group_id: i64, permission_ids: &[i64]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM auth_group_permissions WHERE group_id = ?1",
            params![group_id],
        )?;
        for permission_id in permission_ids {
            tx.execute(
                "INSERT OR IGNORE INTO auth_group_permissions (group_id, permission_id)
                 VALUES (?1, ?2)",
                params![group_id, permission_id],
            )
            .context("Failed to assign group permission")?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All Permission records linked to the group
    pub fn group_permissions(&self, group_id: i64) -> Result<Vec<Permission>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM auth_permissions p
             JOIN auth_group_permissions gp ON gp.permission_id = p.id
             WHERE gp.group_id = ?1
             ORDER BY p.id"
        ))?;
        let permissions = stmt
            .query_map(params![group_id], permission_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(permissions)
    }

    // ---------------------------------------------------------- permissions

    /// Register a permission, returning the existing row when already present
    pub fn create_permission(
        &self,
        name: &str,
        app_label: &str,
        model: &str,
        codename: &str,
    ) -> Result<Permission> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO auth_permissions (name, app_label, model, codename)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, app_label, model, codename],
        )
        .context("Failed to insert permission")?;

        let permission = conn.query_row(
            &format!(
                "SELECT {PERMISSION_COLUMNS} FROM auth_permissions p
                 WHERE p.app_label = ?1 AND p.model = ?2 AND p.codename = ?3"
            ),
            params![app_label, model, codename],
            permission_from_row,
        )?;
        Ok(permission)
    }

    pub fn get_permission(&self, permission_id: i64) -> Result<Option<Permission>> {
        let conn = self.conn.lock();
        let permission = conn
            .query_row(
                &format!("SELECT {PERMISSION_COLUMNS} FROM auth_permissions p WHERE p.id = ?1"),
                params![permission_id],
                permission_from_row,
            )
            .optional()?;
        Ok(permission)
    }

    /// Look up a permission by its dotted `app_label.codename` form
    pub fn find_permission_by_code(&self, code: &str) -> Result<Option<Permission>> {
        let Some((app_label, codename)) = code.split_once('.') else {
            return Ok(None);
        };

        let conn = self.conn.lock();
        let permission = conn
            .query_row(
                &format!(
                    "SELECT {PERMISSION_COLUMNS} FROM auth_permissions p
                     WHERE p.app_label = ?1 AND p.codename = ?2
                     ORDER BY p.id LIMIT 1"
                ),
                params![app_label, codename],
                permission_from_row,
            )
            .optional()?;
        Ok(permission)
    }

    pub fn list_permissions(&self) -> Result<Vec<Permission>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM auth_permissions p ORDER BY p.id"
        ))?;
        let permissions = stmt
            .query_map([], permission_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(permissions)
    }

    /// Ids from `ids` with no matching group row
    pub fn missing_group_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let known: HashSet<i64> = self.list_groups()?.into_iter().map(|g| g.id).collect();
        Ok(ids.iter().copied().filter(|id| !known.contains(id)).collect())
    }

    /// Ids from `ids` with no matching permission row
    pub fn missing_permission_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let known: HashSet<i64> = self.list_permissions()?.into_iter().map(|p| p.id).collect();
        Ok(ids.iter().copied().filter(|id| !known.contains(id)).collect())
    }
}

fn link_groups(conn: &Connection, user_id: &Uuid, group_ids: &[i64]) -> Result<()> {
    for group_id in group_ids {
        conn.execute(
            "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
            params![user_id.to_string(), group_id],
        )
        .context("Failed to assign group")?;
    }
    Ok(())
}

fn link_permissions(conn: &Connection, user_id: &Uuid, permission_ids: &[i64]) -> Result<()> {
    for permission_id in permission_ids {
        conn.execute(
            "INSERT OR IGNORE INTO user_permissions (user_id, permission_id) VALUES (?1, ?2)",
            params![user_id.to_string(), permission_id],
        )
        .context("Failed to assign permission")?;
    }
    Ok(())
}

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_timestamp(index: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let user_typ: String = row.get(6)?;
    let date_joined: String = row.get(8)?;
    let last_login: Option<String> = row.get(9)?;

    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        is_active: row.get(3)?,
        is_staff: row.get(4)?,
        is_superuser: row.get(5)?,
        user_typ: UserType::parse(&user_typ).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                Type::Text,
                format!("unknown user_typ: {user_typ}").into(),
            )
        })?,
        user_code: row.get(7)?,
        date_joined: parse_timestamp(8, &date_joined)?,
        last_login: last_login
            .map(|raw| parse_timestamp(9, &raw))
            .transpose()?,
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn permission_from_row(row: &Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        id: row.get(0)?,
        name: row.get(1)?,
        app_label: row.get(2)?,
        model: row.get(3)?,
        codename: row.get(4)?,
    })
}
