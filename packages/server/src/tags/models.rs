//! `GroupTag` / `GroupTagLink` rows.
//!
//! CRUD follows the teacher's direct-`sqlx::query_as`-per-method style
//! (no generic ORM trait) rather than a `Record`-style abstraction.

use crate::common::entity_ids::{GroupTagId, GroupTagLinkId};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum TagType {
    Static,
    Dynamic,
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagType::Static => write!(f, "STATIC"),
            TagType::Dynamic => write!(f, "DYNAMIC"),
        }
    }
}

impl FromStr for TagType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STATIC" => Ok(TagType::Static),
            "DYNAMIC" => Ok(TagType::Dynamic),
            other => Err(format!("unknown tag type: {other}")),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupTag {
    pub id: GroupTagId,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<String>,
    pub bot_id: Option<String>,
    pub tag_type: TagType,
    pub dynamic_rule: Option<String>,
    pub is_blacklist: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TagModelError {
    #[error("a STATIC tag cannot carry a dynamic_rule")]
    StaticTagWithRule,
    #[error("a DYNAMIC tag cannot carry links")]
    DynamicTagWithLinks,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl GroupTag {
    pub async fn find_by_name(
        name: &str,
        bot_id: Option<&str>,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GroupTag>(
            r#"SELECT id, name, description, owner_id, bot_id, tag_type, dynamic_rule, is_blacklist
               FROM group_tags WHERE name = $1 AND (bot_id = $2 OR bot_id IS NULL)
               ORDER BY bot_id NULLS LAST LIMIT 1"#,
        )
        .bind(name)
        .bind(bot_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create_static(
        name: &str,
        description: Option<&str>,
        owner_id: Option<&str>,
        bot_id: Option<&str>,
        is_blacklist: bool,
        pool: &PgPool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GroupTag>(
            r#"INSERT INTO group_tags (id, name, description, owner_id, bot_id, tag_type, dynamic_rule, is_blacklist)
               VALUES ($1, $2, $3, $4, $5, 'STATIC', NULL, $6)
               RETURNING id, name, description, owner_id, bot_id, tag_type, dynamic_rule, is_blacklist"#,
        )
        .bind(GroupTagId::new())
        .bind(name)
        .bind(description)
        .bind(owner_id)
        .bind(bot_id)
        .bind(is_blacklist)
        .fetch_one(pool)
        .await
    }

    pub async fn create_dynamic(
        name: &str,
        description: Option<&str>,
        owner_id: Option<&str>,
        bot_id: Option<&str>,
        dynamic_rule: &str,
        is_blacklist: bool,
        pool: &PgPool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GroupTag>(
            r#"INSERT INTO group_tags (id, name, description, owner_id, bot_id, tag_type, dynamic_rule, is_blacklist)
               VALUES ($1, $2, $3, $4, $5, 'DYNAMIC', $6, $7)
               RETURNING id, name, description, owner_id, bot_id, tag_type, dynamic_rule, is_blacklist"#,
        )
        .bind(GroupTagId::new())
        .bind(name)
        .bind(description)
        .bind(owner_id)
        .bind(bot_id)
        .bind(dynamic_rule)
        .bind(is_blacklist)
        .fetch_one(pool)
        .await
    }

    pub async fn set_blacklist(&self, is_blacklist: bool, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE group_tags SET is_blacklist = $1 WHERE id = $2")
            .bind(is_blacklist)
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM group_tags WHERE id = $1")
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupTagLink {
    pub id: GroupTagLinkId,
    pub tag_id: GroupTagId,
    pub group_id: String,
}

impl GroupTagLink {
    /// Adding a link to a DYNAMIC tag is a modeling error, not a constraint
    /// the database enforces — callers must check `tag.tag_type` first.
    pub async fn add(tag: &GroupTag, group_id: &str, pool: &PgPool) -> Result<Self, TagModelError> {
        if tag.tag_type == TagType::Dynamic {
            return Err(TagModelError::DynamicTagWithLinks);
        }
        let row = sqlx::query_as::<_, GroupTagLink>(
            r#"INSERT INTO group_tag_links (id, tag_id, group_id)
               VALUES ($1, $2, $3)
               ON CONFLICT (tag_id, group_id) DO UPDATE SET group_id = EXCLUDED.group_id
               RETURNING id, tag_id, group_id"#,
        )
        .bind(GroupTagLinkId::new())
        .bind(tag.id)
        .bind(group_id)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    pub async fn remove(tag_id: GroupTagId, group_id: &str, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM group_tag_links WHERE tag_id = $1 AND group_id = $2")
            .bind(tag_id)
            .bind(group_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn for_tag(tag_id: GroupTagId, pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GroupTagLink>(
            "SELECT id, tag_id, group_id FROM group_tag_links WHERE tag_id = $1",
        )
        .bind(tag_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_type_round_trips_through_display_and_from_str() {
        assert_eq!(TagType::from_str("static").unwrap(), TagType::Static);
        assert_eq!(TagType::from_str("DYNAMIC").unwrap(), TagType::Dynamic);
        assert_eq!(TagType::Static.to_string(), "STATIC");
        assert!(TagType::from_str("bogus").is_err());
    }
}
