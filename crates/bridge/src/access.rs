/// Check whether a sender may talk to the bridge.
///
/// An empty allowlist admits everyone. Entries match the numeric sender id
/// or, case-insensitively, the username (with or without a leading `@`).
pub fn is_allowed(allowlist: &[String], sender_id: i64, username: Option<&str>) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let id = sender_id.to_string();
    let username = username.map(|u| u.trim_start_matches('@').to_lowercase());
    allowlist.iter().any(|entry| {
        let entry = entry.trim();
        if entry == id {
            return true;
        }
        let entry = entry.trim_start_matches('@').to_lowercase();
        username.as_deref().is_some_and(|u| !u.is_empty() && u == entry)
    })
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| (*s).to_string()).collect()
    }

    #[rstest]
    #[case(&[], 1, None, true)]
    #[case(&[], 99, Some("anyone"), true)]
    #[case(&["42"], 42, None, true)]
    #[case(&["42"], 43, None, false)]
    #[case(&["42"], 43, Some("alice"), false)]
    #[case(&["Alice"], 7, Some("alice"), true)]
    #[case(&["@alice"], 7, Some("ALICE"), true)]
    #[case(&["alice", "100"], 100, Some("bob"), true)]
    #[case(&["alice"], 7, None, false)]
    fn allowlist(
        #[case] entries: &[&str],
        #[case] sender_id: i64,
        #[case] username: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(is_allowed(&list(entries), sender_id, username), expected);
    }
}
