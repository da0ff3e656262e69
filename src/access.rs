//! Access-control metadata attached to drives, directories and files.
//!
//! Every node carries an [`AccessSettings`]: a clearance pair plus four
//! username lists. The list mutators maintain the cross-list invariants so
//! that a username never appears in contradictory roles.

use std::collections::BTreeSet;

use bson::{doc, Bson, Document};

use crate::error::{Error, Result};

/// Lowest assignable clearance.
pub const MIN_CLEARANCE: u8 = 1;

/// Highest assignable clearance; principals at this level are
/// administrators.
pub const MAX_CLEARANCE: u8 = 5;

/// Clearance required for admin-only commands.
pub const ADMIN_CLEARANCE: u8 = MAX_CLEARANCE;

/// Validates a clearance level.
pub fn check_clearance(level: u8) -> Result<()> {
    if !(MIN_CLEARANCE..=MAX_CLEARANCE).contains(&level) {
        return Err(Error::InvalidClearancePair);
    }
    Ok(())
}

/// Clearance pair and whitelist/blacklist bundle for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSettings {
    access_clearance: u8,
    modify_clearance: u8,
    access_whitelist: BTreeSet<String>,
    access_blacklist: BTreeSet<String>,
    modify_whitelist: BTreeSet<String>,
    modify_blacklist: BTreeSet<String>,
}

impl AccessSettings {
    /// Creates settings with empty lists.
    ///
    /// Fails with [`Error::InvalidClearancePair`] when `modify < access` or
    /// either level lies outside 1-5.
    pub fn new(access_clearance: u8, modify_clearance: u8) -> Result<Self> {
        check_clearance(access_clearance)?;
        check_clearance(modify_clearance)?;
        if modify_clearance < access_clearance {
            return Err(Error::InvalidClearancePair);
        }
        Ok(Self {
            access_clearance,
            modify_clearance,
            access_whitelist: BTreeSet::new(),
            access_blacklist: BTreeSet::new(),
            modify_whitelist: BTreeSet::new(),
            modify_blacklist: BTreeSet::new(),
        })
    }

    pub fn access_clearance(&self) -> u8 {
        self.access_clearance
    }

    pub fn modify_clearance(&self) -> u8 {
        self.modify_clearance
    }

    /// Replaces the clearance pair, revalidating the invariant.
    pub fn set_clearances(&mut self, access: u8, modify: u8) -> Result<()> {
        check_clearance(access)?;
        check_clearance(modify)?;
        if modify < access {
            return Err(Error::InvalidClearancePair);
        }
        self.access_clearance = access;
        self.modify_clearance = modify;
        Ok(())
    }

    pub fn access_whitelist(&self) -> impl Iterator<Item = &str> {
        self.access_whitelist.iter().map(String::as_str)
    }

    pub fn access_blacklist(&self) -> impl Iterator<Item = &str> {
        self.access_blacklist.iter().map(String::as_str)
    }

    pub fn modify_whitelist(&self) -> impl Iterator<Item = &str> {
        self.modify_whitelist.iter().map(String::as_str)
    }

    pub fn modify_blacklist(&self) -> impl Iterator<Item = &str> {
        self.modify_blacklist.iter().map(String::as_str)
    }

    /// Whitelists `users` for access. Removes them from the access
    /// blacklist.
    pub fn add_users_access_whitelist(&mut self, users: &[String]) {
        for user in users {
            self.access_blacklist.remove(user);
            self.access_whitelist.insert(user.clone());
        }
    }

    /// Blacklists `users` for access.
    ///
    /// Blacklisting access implies no access at all, so the users are also
    /// removed from the access whitelist and from both modify lists.
    pub fn add_users_access_blacklist(&mut self, users: &[String]) {
        for user in users {
            self.access_whitelist.remove(user);
            self.modify_whitelist.remove(user);
            self.modify_blacklist.remove(user);
            self.access_blacklist.insert(user.clone());
        }
    }

    /// Whitelists `users` for modification.
    ///
    /// Modification requires access, so the users are ensured in the access
    /// whitelist and removed from both blacklists.
    pub fn add_users_modify_whitelist(&mut self, users: &[String]) {
        for user in users {
            self.access_blacklist.remove(user);
            self.modify_blacklist.remove(user);
            self.access_whitelist.insert(user.clone());
            self.modify_whitelist.insert(user.clone());
        }
    }

    /// Blacklists `users` for modification. Removes them from the modify
    /// whitelist.
    pub fn add_users_modify_blacklist(&mut self, users: &[String]) {
        for user in users {
            self.modify_whitelist.remove(user);
            self.modify_blacklist.insert(user.clone());
        }
    }

    pub fn remove_users_access_whitelist(&mut self, users: &[String]) {
        for user in users {
            self.access_whitelist.remove(user);
        }
    }

    pub fn remove_users_access_blacklist(&mut self, users: &[String]) {
        for user in users {
            self.access_blacklist.remove(user);
        }
    }

    pub fn remove_users_modify_whitelist(&mut self, users: &[String]) {
        for user in users {
            self.modify_whitelist.remove(user);
        }
    }

    pub fn remove_users_modify_blacklist(&mut self, users: &[String]) {
        for user in users {
            self.modify_blacklist.remove(user);
        }
    }

    /// Evaluates the access decision for `user` with clearance `clearance`.
    pub fn can_access(&self, user: &str, clearance: u8) -> bool {
        if self.access_blacklist.contains(user) {
            return false;
        }
        self.access_whitelist.contains(user) || clearance >= self.access_clearance
    }

    /// Evaluates the modify decision for `user` with clearance `clearance`.
    ///
    /// Modification implies access.
    pub fn can_modify(&self, user: &str, clearance: u8) -> bool {
        if !self.can_access(user, clearance) {
            return false;
        }
        if self.modify_blacklist.contains(user) {
            return false;
        }
        self.modify_whitelist.contains(user) || clearance >= self.modify_clearance
    }

    /// Renders the settings as a BSON document for response payloads.
    pub fn to_document(&self) -> Document {
        fn list(set: &BTreeSet<String>) -> Bson {
            Bson::Array(set.iter().cloned().map(Bson::String).collect())
        }
        doc! {
            "accessclearance": self.access_clearance as i32,
            "modifyclearance": self.modify_clearance as i32,
            "accesswhitelist": list(&self.access_whitelist),
            "accessblacklist": list(&self.access_blacklist),
            "modifywhitelist": list(&self.modify_whitelist),
            "modifyblacklist": list(&self.modify_blacklist),
        }
    }

    /// Rebuilds settings from a BSON document.
    ///
    /// The four lists are re-added through the invariant-preserving
    /// mutators, so a document with contradictory membership is normalized
    /// rather than trusted.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let access = doc
            .get_i32("accessclearance")
            .map_err(|e| Error::InvalidArgumentMap(e.to_string()))?;
        let modify = doc
            .get_i32("modifyclearance")
            .map_err(|e| Error::InvalidArgumentMap(e.to_string()))?;
        let access = u8::try_from(access).map_err(|_| Error::InvalidClearancePair)?;
        let modify = u8::try_from(modify).map_err(|_| Error::InvalidClearancePair)?;
        let mut settings = Self::new(access, modify)?;
        settings.add_users_access_whitelist(&string_list(doc, "accesswhitelist")?);
        settings.add_users_access_blacklist(&string_list(doc, "accessblacklist")?);
        settings.add_users_modify_whitelist(&string_list(doc, "modifywhitelist")?);
        settings.add_users_modify_blacklist(&string_list(doc, "modifyblacklist")?);
        Ok(settings)
    }
}

fn string_list(doc: &Document, key: &str) -> Result<Vec<String>> {
    match doc.get(key) {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| match item {
                Bson::String(s) => Ok(s.clone()),
                other => Err(Error::InvalidArgumentMap(format!(
                    "expected string in {key:?}, got {other}"
                ))),
            })
            .collect(),
        Some(other) => Err(Error::InvalidArgumentMap(format!(
            "expected array for {key:?}, got {other}"
        ))),
    }
}
