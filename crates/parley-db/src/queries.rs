use crate::Database;
use crate::models::{ChatRow, DeletedMessage, MemberRow, MessageRow, ReactionRow, ReactionToggle, StarRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

const MESSAGE_COLUMNS: &str = "m.id, m.chat_id, m.sender_id, u.name, u.profile_pic, m.content, m.reply_to_id, m.created_at, m.updated_at";

const CHAT_COLUMNS: &str =
    "c.id, c.is_group_chat, c.chat_name, c.group_admin_id, c.latest_message_id, c.created_at, c.updated_at";

impl Database {
    // -- Users --

    /// Insert a user. Returns false when the email is already registered.
    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        profile_pic: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, profile_pic) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![id, name, email, password_hash, profile_pic],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// How many of `ids` name existing users.
    pub fn count_users(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM users WHERE id IN ({})", placeholders(ids.len()));
            let count: i64 = conn.query_row(&sql, rusqlite::params_from_iter(ids.iter()), |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    // -- Chats --

    /// Create a chat and its participant set in one transaction.
    pub fn create_chat(
        &self,
        id: &str,
        is_group_chat: bool,
        chat_name: Option<&str>,
        group_admin_id: Option<&str>,
        member_ids: &[String],
    ) -> Result<()> {
        self.with_tx(|conn| {
            conn.execute(
                "INSERT INTO chats (id, is_group_chat, chat_name, group_admin_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, is_group_chat, chat_name, group_admin_id],
            )?;
            let mut stmt = conn.prepare("INSERT OR IGNORE INTO chat_users (chat_id, user_id) VALUES (?1, ?2)")?;
            for member in member_ids {
                stmt.execute(rusqlite::params![id, member])?;
            }
            Ok(())
        })
    }

    /// The one-to-one chat between two users, if it exists.
    pub fn find_direct_chat(&self, user_a: &str, user_b: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT c.id FROM chats c
                 WHERE c.is_group_chat = 0
                   AND EXISTS (SELECT 1 FROM chat_users WHERE chat_id = c.id AND user_id = ?1)
                   AND EXISTS (SELECT 1 FROM chat_users WHERE chat_id = c.id AND user_id = ?2)
                 LIMIT 1",
                rusqlite::params![user_a, user_b],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = ?1"),
                [id],
                map_chat,
            )
            .optional()
        })
    }

    /// Chats a user belongs to, most recent activity first.
    pub fn get_chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAT_COLUMNS} FROM chats c
                 JOIN chat_users cu ON cu.chat_id = c.id
                 WHERE cu.user_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_chat)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_chat_ids_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT chat_id FROM chat_users WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Participants in join order.
    pub fn get_chat_members(&self, chat_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.email, u.profile_pic
                 FROM chat_users cu
                 JOIN users u ON u.id = cu.user_id
                 WHERE cu.chat_id = ?1
                 ORDER BY cu.rowid",
            )?;
            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(MemberRow {
                        user_id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        profile_pic: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_chat_member(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chat_users WHERE chat_id = ?1 AND user_id = ?2",
                    rusqlite::params![chat_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn rename_chat(&self, chat_id: &str, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!("UPDATE chats SET chat_name = ?2, updated_at = {NOW} WHERE id = ?1"),
                rusqlite::params![chat_id, name],
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns false if the user was already a participant.
    pub fn add_chat_member(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO chat_users (chat_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![chat_id, user_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns false if the user was not a participant.
    pub fn remove_chat_member(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM chat_users WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    // -- Pins --

    /// Pinned messages of a chat in pin order.
    pub fn get_pinned_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM chat_pins p
                 JOIN messages m ON m.id = p.message_id
                 JOIN users u ON u.id = m.sender_id
                 WHERE p.chat_id = ?1
                 ORDER BY p.seq"
            ))?;
            let rows = stmt
                .query_map([chat_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Toggle a message in a chat's pinned set: removes if present, appends if not.
    /// Returns `None` if the message is not (or no longer) part of the chat,
    /// otherwise `Some(pinned)` with the new state.
    pub fn toggle_pin(&self, chat_id: &str, message_id: &str) -> Result<Option<bool>> {
        self.with_tx(|conn| {
            let in_chat: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM messages WHERE id = ?1 AND chat_id = ?2",
                    rusqlite::params![message_id, chat_id],
                    |row| row.get(0),
                )
                .optional()?;
            if in_chat.is_none() {
                return Ok(None);
            }

            let removed = conn.execute(
                "DELETE FROM chat_pins WHERE chat_id = ?1 AND message_id = ?2",
                rusqlite::params![chat_id, message_id],
            )?;
            if removed > 0 {
                return Ok(Some(false));
            }

            conn.execute(
                "INSERT INTO chat_pins (chat_id, message_id) VALUES (?1, ?2)",
                rusqlite::params![chat_id, message_id],
            )?;
            Ok(Some(true))
        })
    }

    // -- Messages --

    /// Insert a message and point the chat's latest message at it.
    pub fn insert_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<()> {
        self.with_tx(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, reply_to_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, chat_id, sender_id, content, reply_to_id],
            )?;
            conn.execute(
                &format!("UPDATE chats SET latest_message_id = ?1, updated_at = {NOW} WHERE id = ?2"),
                rusqlite::params![id, chat_id],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     JOIN users u ON u.id = m.sender_id
                     WHERE m.id = ?1"
                ),
                [id],
                map_message,
            )
            .optional()
        })
    }

    /// All messages of a chat, oldest first.
    pub fn get_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 JOIN users u ON u.id = m.sender_id
                 WHERE m.chat_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC"
            ))?;
            let rows = stmt
                .query_map([chat_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Replace a message's content and bump `updated_at`.
    /// Returns false if the message does not exist.
    pub fn update_message_content(&self, id: &str, content: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!("UPDATE messages SET content = ?2, updated_at = {NOW} WHERE id = ?1"),
                rusqlite::params![id, content],
            )?;
            Ok(changed > 0)
        })
    }

    /// Hard delete. Reactions, stars and pins cascade; replies keep a null
    /// reference. The chat's latest message is recomputed in the same
    /// transaction so previews never point at a deleted message.
    pub fn delete_message(&self, id: &str) -> Result<Option<DeletedMessage>> {
        self.with_tx(|conn| {
            let chat_id: Option<String> = conn
                .query_row("SELECT chat_id FROM messages WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            let Some(chat_id) = chat_id else {
                return Ok(None);
            };

            conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            conn.execute(
                "UPDATE chats SET latest_message_id = (
                     SELECT id FROM messages WHERE chat_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1
                 ) WHERE id = ?1",
                [&chat_id],
            )?;

            let latest_message_id: Option<String> = conn.query_row(
                "SELECT latest_message_id FROM chats WHERE id = ?1",
                [&chat_id],
                |row| row.get(0),
            )?;

            Ok(Some(DeletedMessage {
                chat_id,
                latest_message_id,
            }))
        })
    }

    // -- Reactions --

    /// Toggle a user's reaction atomically, keyed by (message, user):
    /// no reaction appends, the same emoji removes, a different emoji
    /// replaces in place. Returns `None` if the message does not exist.
    pub fn toggle_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<Option<ReactionToggle>> {
        self.with_tx(|conn| {
            if !message_exists(conn, message_id)? {
                return Ok(None);
            }

            let existing: Option<String> = conn
                .query_row(
                    "SELECT emoji FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                    rusqlite::params![message_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match existing {
                None => {
                    conn.execute(
                        "INSERT INTO reactions (message_id, user_id, emoji) VALUES (?1, ?2, ?3)",
                        rusqlite::params![message_id, user_id, emoji],
                    )?;
                    ReactionToggle::Added
                }
                Some(current) if current == emoji => {
                    conn.execute(
                        "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                        rusqlite::params![message_id, user_id],
                    )?;
                    ReactionToggle::Removed
                }
                Some(_) => {
                    conn.execute(
                        "UPDATE reactions SET emoji = ?3 WHERE message_id = ?1 AND user_id = ?2",
                        rusqlite::params![message_id, user_id, emoji],
                    )?;
                    ReactionToggle::Switched
                }
            };
            Ok(Some(outcome))
        })
    }

    /// Batch-fetch reactions for a set of message IDs, in reaction order.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, user_id, emoji FROM reactions WHERE message_id IN ({}) ORDER BY seq",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(message_ids.iter()), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Stars --

    /// Toggle `user_id` in the message's starred set.
    /// Returns `None` if the message does not exist, otherwise whether it
    /// is starred by the user after the call.
    pub fn toggle_star(&self, message_id: &str, user_id: &str) -> Result<Option<bool>> {
        self.with_tx(|conn| {
            if !message_exists(conn, message_id)? {
                return Ok(None);
            }

            let removed = conn.execute(
                "DELETE FROM stars WHERE message_id = ?1 AND user_id = ?2",
                rusqlite::params![message_id, user_id],
            )?;
            if removed > 0 {
                return Ok(Some(false));
            }

            conn.execute(
                "INSERT INTO stars (message_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![message_id, user_id],
            )?;
            Ok(Some(true))
        })
    }

    pub fn get_stars_for_messages(&self, message_ids: &[String]) -> Result<Vec<StarRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, user_id FROM stars WHERE message_id IN ({}) ORDER BY seq",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(message_ids.iter()), |row| {
                    Ok(StarRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, email, password, profile_pic, created_at FROM users WHERE {column} = ?1"
    ))?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            profile_pic: row.get(4)?,
            created_at: row.get(5)?,
        })
    })
    .optional()
}

fn message_exists(conn: &Connection, message_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM messages WHERE id = ?1", [message_id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        sender_pic: row.get(4)?,
        content: row.get(5)?,
        reply_to_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_chat(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        is_group_chat: row.get(1)?,
        chat_name: row.get(2)?,
        group_admin_id: row.get(3)?,
        latest_message_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id() -> String {
        Uuid::new_v4().to_string()
    }

    fn seed() -> (Database, String, String, String) {
        let db = Database::open_in_memory().unwrap();
        let alice = id();
        let bob = id();
        db.create_user(&alice, "Alice", "alice@example.com", "x", "pic").unwrap();
        db.create_user(&bob, "Bob", "bob@example.com", "x", "pic").unwrap();
        let chat = id();
        db.create_chat(&chat, false, None, None, &[alice.clone(), bob.clone()]).unwrap();
        (db, alice, bob, chat)
    }

    #[test]
    fn taken_email_is_reported_not_raised() {
        let (db, alice, _, _) = seed();
        let again = id();
        assert!(!db.create_user(&again, "Other Alice", "alice@example.com", "y", "pic").unwrap());
        assert!(db.get_user_by_id(&again).unwrap().is_none());
        assert_eq!(db.get_user_by_email("alice@example.com").unwrap().map(|u| u.id), Some(alice));
        assert!(db.create_user(&again, "Dana", "dana@example.com", "y", "pic").unwrap());
    }

    #[test]
    fn reaction_toggle_add_switch_remove() {
        let (db, alice, bob, chat) = seed();
        let msg = id();
        db.insert_message(&msg, &chat, &alice, "hi", None).unwrap();

        assert_eq!(db.toggle_reaction(&msg, &bob, "👍").unwrap(), Some(ReactionToggle::Added));
        assert_eq!(db.toggle_reaction(&msg, &alice, "🎉").unwrap(), Some(ReactionToggle::Added));
        assert_eq!(db.toggle_reaction(&msg, &bob, "❤️").unwrap(), Some(ReactionToggle::Switched));

        // Switching keeps Bob's position ahead of Alice.
        let rows = db.get_reactions_for_messages(&[msg.clone()]).unwrap();
        let order: Vec<_> = rows.iter().map(|r| (r.user_id.clone(), r.emoji.clone())).collect();
        assert_eq!(order, vec![(bob.clone(), "❤️".to_string()), (alice.clone(), "🎉".to_string())]);

        assert_eq!(db.toggle_reaction(&msg, &bob, "❤️").unwrap(), Some(ReactionToggle::Removed));
        assert_eq!(db.get_reactions_for_messages(&[msg]).unwrap().len(), 1);
    }

    #[test]
    fn toggles_on_missing_message_return_none() {
        let (db, alice, _, chat) = seed();
        let missing = id();
        assert_eq!(db.toggle_reaction(&missing, &alice, "👍").unwrap(), None);
        assert_eq!(db.toggle_star(&missing, &alice).unwrap(), None);
        assert_eq!(db.toggle_pin(&chat, &missing).unwrap(), None);
    }

    #[test]
    fn star_toggle_never_duplicates() {
        let (db, alice, _, chat) = seed();
        let msg = id();
        db.insert_message(&msg, &chat, &alice, "hi", None).unwrap();

        assert_eq!(db.toggle_star(&msg, &alice).unwrap(), Some(true));
        assert_eq!(db.get_stars_for_messages(&[msg.clone()]).unwrap().len(), 1);
        assert_eq!(db.toggle_star(&msg, &alice).unwrap(), Some(false));
        assert!(db.get_stars_for_messages(&[msg]).unwrap().is_empty());
    }

    #[test]
    fn insert_updates_latest_and_delete_recomputes_it() {
        let (db, alice, bob, chat) = seed();
        let first = id();
        let second = id();
        db.insert_message(&first, &chat, &alice, "one", None).unwrap();
        db.insert_message(&second, &chat, &bob, "two", Some(first.as_str())).unwrap();
        assert_eq!(db.get_chat(&chat).unwrap().unwrap().latest_message_id, Some(second.clone()));

        db.toggle_pin(&chat, &second).unwrap();
        let deleted = db.delete_message(&second).unwrap().unwrap();
        assert_eq!(deleted.chat_id, chat);
        assert_eq!(deleted.latest_message_id, Some(first.clone()));
        assert!(db.get_pinned_messages(&chat).unwrap().is_empty());

        // Deleting a reply target leaves the reply with a null reference.
        let reply = id();
        db.insert_message(&reply, &chat, &bob, "re", Some(first.as_str())).unwrap();
        db.delete_message(&first).unwrap();
        assert_eq!(db.get_message(&reply).unwrap().unwrap().reply_to_id, None);
        assert!(db.delete_message(&first).unwrap().is_none());
    }

    #[test]
    fn pin_toggle_appends_and_removes() {
        let (db, alice, _, chat) = seed();
        let a = id();
        let b = id();
        db.insert_message(&a, &chat, &alice, "a", None).unwrap();
        db.insert_message(&b, &chat, &alice, "b", None).unwrap();

        assert_eq!(db.toggle_pin(&chat, &a).unwrap(), Some(true));
        assert_eq!(db.toggle_pin(&chat, &b).unwrap(), Some(true));
        let pinned: Vec<_> = db.get_pinned_messages(&chat).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(pinned, vec![a.clone(), b.clone()]);

        assert_eq!(db.toggle_pin(&chat, &a).unwrap(), Some(false));
        let pinned: Vec<_> = db.get_pinned_messages(&chat).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(pinned, vec![b]);
    }

    #[test]
    fn direct_chat_lookup_and_membership() {
        let (db, alice, bob, chat) = seed();
        assert_eq!(db.find_direct_chat(&bob, &alice).unwrap(), Some(chat.clone()));
        assert!(db.is_chat_member(&chat, &alice).unwrap());

        let carol = id();
        db.create_user(&carol, "Carol", "carol@example.com", "x", "pic").unwrap();
        assert!(!db.is_chat_member(&chat, &carol).unwrap());
        assert_eq!(db.find_direct_chat(&alice, &carol).unwrap(), None);
        assert_eq!(db.count_users(&[alice, carol, id()]).unwrap(), 2);
    }
}
