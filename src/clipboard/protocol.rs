//! Selection-protocol decisions that do not need a display.
//!
//! Everything here is generic over the atom type so the owner's reply rules
//! and the requester's encoding negotiation can be exercised with plain
//! integers.

use super::ClipboardError;

/// Fixed part of a `ChangeProperty` request, in bytes.
const CHANGE_PROPERTY_HEADER: u64 = 24;

/// Atoms that name the text targets, resolved once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextAtoms<A> {
    pub targets: A,
    pub text: A,
    pub string: A,
    /// `UTF8_STRING`, when the server already knows it.
    pub utf8: Option<A>,
}

/// What an owner writes back for one conversion request.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply<'a, A> {
    /// An `ATOM` list, format 32.
    Targets(Vec<A>),
    /// The payload tagged with `encoding`, format 8.
    Text { encoding: A, data: &'a [u8] },
    /// Notify with property `None`.
    Refuse,
}

impl<A: Copy + Eq> TextAtoms<A> {
    /// Every target this owner answers with text, most specific first.
    ///
    /// This is exactly the list advertised for `TARGETS`.
    pub fn served(&self) -> Vec<A> {
        let mut served = Vec::with_capacity(3);
        served.extend(self.utf8);
        served.push(self.string);
        served.push(self.text);
        served
    }

    /// Encodings a requester asks for, in order, before giving up.
    pub fn request_order(&self) -> Vec<A> {
        let mut order = Vec::with_capacity(2);
        order.extend(self.utf8);
        order.push(self.string);
        order
    }

    pub fn plan_reply<'a>(&self, target: A, payload: &'a [u8]) -> Reply<'a, A> {
        if target == self.targets {
            Reply::Targets(self.served())
        } else if target == self.string || target == self.text {
            Reply::Text {
                encoding: self.string,
                data: payload,
            }
        } else if Some(target) == self.utf8 {
            Reply::Text {
                encoding: target,
                data: payload,
            }
        } else {
            Reply::Refuse
        }
    }

    /// Whether data an owner delivered as `received` can be handed to the
    /// caller as text.
    ///
    /// Owners asked for `TEXT` or `UTF8_STRING` may legitimately answer in
    /// `STRING`, so any text encoding is taken, not only the one requested.
    pub fn accepts(&self, received: A) -> bool {
        received == self.string || Some(received) == self.utf8
    }
}

/// Property an owner should write to for a request.
///
/// Obsolete requesters send `None` as the property and expect the reply in
/// a property named after the target.
pub fn reply_property<A: Copy + Eq>(requested: A, target: A, none: A) -> A {
    if requested == none { target } else { requested }
}

/// Confirms that `owner`, as reported by the server right after we claimed
/// `selection`, is our own window.
pub fn ensure_owner<A: Eq>(owner: A, ours: A, selection: &str) -> Result<(), ClipboardError> {
    if owner == ours {
        Ok(())
    } else {
        Err(ClipboardError::OwnershipDenied {
            selection: selection.to_string(),
        })
    }
}

/// Whether a format-8 property of `len` bytes fits in a single request when
/// the server accepts at most `max_request_units` four-byte units.
pub fn fits_request(len: usize, max_request_units: u32) -> bool {
    let padded = (len as u64).div_ceil(4).saturating_mul(4);
    padded.saturating_add(CHANGE_PROPERTY_HEADER) <= u64::from(max_request_units) * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: u32 = 0;
    const STRING: u32 = 31;
    const TARGETS: u32 = 300;
    const TEXT: u32 = 301;
    const UTF8: u32 = 302;
    const PNG: u32 = 400;

    fn atoms() -> TextAtoms<u32> {
        TextAtoms {
            targets: TARGETS,
            text: TEXT,
            string: STRING,
            utf8: Some(UTF8),
        }
    }

    fn latin_only() -> TextAtoms<u32> {
        TextAtoms {
            utf8: None,
            ..atoms()
        }
    }

    #[test]
    fn targets_lists_exactly_what_is_served_as_text() {
        for set in [atoms(), latin_only()] {
            let Reply::Targets(listed) = set.plan_reply(TARGETS, b"x") else {
                panic!("expected a targets reply");
            };
            for target in &listed {
                assert!(
                    matches!(set.plan_reply(*target, b"x"), Reply::Text { .. }),
                    "advertised target {target} is not served"
                );
            }
            let served_count = [STRING, TEXT, UTF8, PNG, TARGETS]
                .into_iter()
                .filter(|t| matches!(set.plan_reply(*t, b"x"), Reply::Text { .. }))
                .count();
            assert_eq!(listed.len(), served_count);
        }
    }

    #[test]
    fn string_and_text_are_answered_as_string() {
        let set = atoms();
        for target in [STRING, TEXT] {
            assert_eq!(
                set.plan_reply(target, b"hello"),
                Reply::Text {
                    encoding: STRING,
                    data: b"hello"
                }
            );
        }
    }

    #[test]
    fn utf8_is_answered_as_utf8() {
        let payload = "h\u{e9}llo".as_bytes();
        assert_eq!(
            atoms().plan_reply(UTF8, payload),
            Reply::Text {
                encoding: UTF8,
                data: payload
            }
        );
    }

    #[test]
    fn unknown_targets_are_refused() {
        assert_eq!(atoms().plan_reply(PNG, b"x"), Reply::Refuse);
        // without UTF8_STRING interned, its id is just another unknown atom
        assert_eq!(latin_only().plan_reply(UTF8, b"x"), Reply::Refuse);
    }

    #[test]
    fn requester_prefers_utf8_then_falls_back() {
        assert_eq!(atoms().request_order(), vec![UTF8, STRING]);
        assert_eq!(latin_only().request_order(), vec![STRING]);
    }

    #[test]
    fn only_text_encodings_are_accepted() {
        let set = atoms();
        assert!(set.accepts(UTF8));
        assert!(set.accepts(STRING));
        assert!(!set.accepts(PNG));
        assert!(!set.accepts(TARGETS));
        assert!(!latin_only().accepts(UTF8));
    }

    #[test]
    fn none_property_falls_back_to_target() {
        assert_eq!(reply_property(NONE, UTF8, NONE), UTF8);
        assert_eq!(reply_property(500, UTF8, NONE), 500);
    }

    #[test]
    fn foreign_owner_is_denied() {
        let err = ensure_owner(7u32, 9u32, "CLIPBOARD").unwrap_err();
        assert!(matches!(
            err,
            ClipboardError::OwnershipDenied { ref selection } if selection == "CLIPBOARD"
        ));
        // no owner at all is also a denial
        assert!(ensure_owner(NONE, 9u32, "PRIMARY").is_err());
        assert!(ensure_owner(9u32, 9u32, "CLIPBOARD").is_ok());
    }

    #[test]
    fn request_size_limit_counts_header_and_padding() {
        // 65535 units is the limit without BIG-REQUESTS
        let max = 65_535u32;
        let room = max as usize * 4 - 24;
        assert!(fits_request(0, max));
        assert!(fits_request(room, max));
        assert!(!fits_request(room + 1, max));
        assert!(!fits_request(usize::MAX, max));
        assert!(fits_request(1, 7));
        assert!(!fits_request(5, 7));
    }
}
