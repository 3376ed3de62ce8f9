use crate::error::{DaemonError, Result};
use nix::unistd::{Group, Uid, User};

/// Numeric identity the child is started with. `None` keeps the parent's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Credentials {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Credentials {
    pub fn is_unchanged(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }
}

/// Resolve a user and group, each given as a name or a numeric id.
///
/// A user without an explicit group runs under the user's primary group.
/// Empty strings count as "not given".
pub fn resolve_credentials(user: Option<&str>, group: Option<&str>) -> Result<Credentials> {
    let user = user.filter(|u| !u.is_empty());
    let group = group.filter(|g| !g.is_empty());

    let gid = group.map(resolve_group).transpose()?;

    let (uid, primary_gid) = match user {
        Some(user) => {
            let (uid, primary) = resolve_user(user)?;
            (Some(uid), primary)
        }
        None => (None, None),
    };

    Ok(Credentials {
        uid,
        gid: gid.or(primary_gid),
    })
}

fn resolve_group(name: &str) -> Result<u32> {
    if let Ok(gid) = name.parse::<u32>() {
        return Ok(gid);
    }

    match Group::from_name(name) {
        Ok(Some(group)) => Ok(group.gid.as_raw()),
        Ok(None) => Err(lookup_failed("group", name, "no such group".to_string())),
        Err(errno) => Err(lookup_failed("group", name, errno.to_string())),
    }
}

/// Returns the uid and, when the account is known, its primary gid.
fn resolve_user(name: &str) -> Result<(u32, Option<u32>)> {
    if let Ok(uid) = name.parse::<u32>() {
        let primary = User::from_uid(Uid::from_raw(uid))
            .ok()
            .flatten()
            .map(|user| user.gid.as_raw());
        return Ok((uid, primary));
    }

    match User::from_name(name) {
        Ok(Some(user)) => Ok((user.uid.as_raw(), Some(user.gid.as_raw()))),
        Ok(None) => Err(lookup_failed("user", name, "no such user".to_string())),
        Err(errno) => Err(lookup_failed("user", name, errno.to_string())),
    }
}

fn lookup_failed(kind: &'static str, name: &str, reason: String) -> DaemonError {
    DaemonError::CredentialResolution {
        kind,
        name: name.to_string(),
        reason,
    }
}
