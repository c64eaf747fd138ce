use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use xcb::x;

use super::protocol::{Reply, TextAtoms, ensure_owner, fits_request, reply_property};
use super::{ClipboardConfig, ClipboardError, Conversion, CopyReport};
use crate::cancel::CancelToken;
use crate::constants::TRANSFER_PROPERTY;
use crate::event_loop::{ControlFlow, EventLoop, EventSource, LoopExit, deadline_after};

/// One display connection plus the unmapped window that owns or requests
/// the selection. Dropping it destroys the window and closes the
/// connection.
struct Session {
    conn: xcb::Connection,
    window: x::Window,
    selection_name: String,
    selection: x::Atom,
    property: x::Atom,
    incr: x::Atom,
    atoms: TextAtoms<x::Atom>,
    /// Largest request the server accepts, in four-byte units.
    max_request_units: u32,
}

/// How an owner dealt with one request.
enum Answer {
    Served,
    Refused,
    /// The requestor vanished before we could write the reply.
    Abandoned,
    /// Not addressed to our selection.
    Ignored,
}

/// Raw outcome of a conversion request, before any text policy.
enum Transfer {
    Data {
        encoding: x::Atom,
        format: u8,
        bytes: Vec<u8>,
        /// Filled when the owner replied with an `ATOM` list.
        atoms: Vec<x::Atom>,
    },
    Refused,
    TimedOut,
}

impl Session {
    fn open(config: &ClipboardConfig) -> Result<Self, ClipboardError> {
        let (conn, screen_num) =
            xcb::Connection::connect(config.display()).map_err(ClipboardError::Unavailable)?;
        let (root, visual) = {
            let setup = conn.get_setup();
            let screen = setup
                .roots()
                .nth(screen_num as usize)
                .ok_or(ClipboardError::NoScreen(screen_num))?;
            (screen.root(), screen.root_visual())
        };

        let window: x::Window = conn.generate_id();
        conn.send_and_check_request(&x::CreateWindow {
            depth: x::COPY_FROM_PARENT as u8,
            wid: window,
            parent: root,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            border_width: 0,
            class: x::WindowClass::InputOutput,
            visual,
            value_list: &[],
        })?;

        let selection = conn.send_request(&x::InternAtom {
            only_if_exists: false,
            name: config.selection().as_bytes(),
        });
        let property = conn.send_request(&x::InternAtom {
            only_if_exists: false,
            name: TRANSFER_PROPERTY.as_bytes(),
        });
        let targets = conn.send_request(&x::InternAtom {
            only_if_exists: false,
            name: b"TARGETS",
        });
        let text = conn.send_request(&x::InternAtom {
            only_if_exists: false,
            name: b"TEXT",
        });
        let utf8 = conn.send_request(&x::InternAtom {
            only_if_exists: true,
            name: b"UTF8_STRING",
        });
        let incr = conn.send_request(&x::InternAtom {
            only_if_exists: false,
            name: b"INCR",
        });

        let selection = conn.wait_for_reply(selection)?.atom();
        let property = conn.wait_for_reply(property)?.atom();
        let targets = conn.wait_for_reply(targets)?.atom();
        let text = conn.wait_for_reply(text)?.atom();
        let utf8 = conn.wait_for_reply(utf8)?.atom();
        let incr = conn.wait_for_reply(incr)?.atom();

        let max_request_units = conn.get_maximum_request_length();
        tracing::debug!(
            selection = config.selection(),
            utf8 = (utf8 != x::ATOM_NONE),
            max_request_units,
            "opened display session"
        );

        Ok(Self {
            conn,
            window,
            selection_name: config.selection().to_string(),
            selection,
            property,
            incr,
            atoms: TextAtoms {
                targets,
                text,
                string: x::ATOM_STRING,
                utf8: (utf8 != x::ATOM_NONE).then_some(utf8),
            },
            max_request_units,
        })
    }

    /// Claims the selection and checks the server actually gave it to us.
    fn acquire(&self) -> Result<(), ClipboardError> {
        self.conn.send_request(&x::SetSelectionOwner {
            owner: self.window,
            selection: self.selection,
            time: x::CURRENT_TIME,
        });
        let cookie = self.conn.send_request(&x::GetSelectionOwner {
            selection: self.selection,
        });
        let owner = self.conn.wait_for_reply(cookie)?.owner();
        if let Err(err) = ensure_owner(owner, self.window, &self.selection_name) {
            tracing::warn!(selection = %self.selection_name, ?owner, "selection ownership denied");
            return Err(err);
        }
        tracing::info!(selection = %self.selection_name, "acquired selection");
        Ok(())
    }

    fn answer(
        &self,
        req: &x::SelectionRequestEvent,
        payload: &[u8],
    ) -> Result<Answer, ClipboardError> {
        if req.selection() != self.selection {
            return Ok(Answer::Ignored);
        }
        let property = reply_property(req.property(), req.target(), x::ATOM_NONE);
        let written = match self.atoms.plan_reply(req.target(), payload) {
            Reply::Targets(list) => Some(self.conn.send_and_check_request(&x::ChangeProperty {
                mode: x::PropMode::Replace,
                window: req.requestor(),
                property,
                r#type: x::ATOM_ATOM,
                data: &list[..],
            })),
            Reply::Text { data, .. } if !fits_request(data.len(), self.max_request_units) => {
                tracing::warn!(
                    len = data.len(),
                    max_request_units = self.max_request_units,
                    "payload too large for a single property write, refusing"
                );
                None
            }
            Reply::Text { encoding, data } => {
                Some(self.conn.send_and_check_request(&x::ChangeProperty {
                    mode: x::PropMode::Replace,
                    window: req.requestor(),
                    property,
                    r#type: encoding,
                    data,
                }))
            }
            Reply::Refuse => None,
        };

        let (notify_property, answer) = match written {
            Some(Ok(())) => (property, Answer::Served),
            Some(Err(xcb::ProtocolError::X(x::Error::Window(_), _))) => {
                // Nobody left to notify.
                tracing::debug!(requestor = ?req.requestor(), "requestor window is gone");
                return Ok(Answer::Abandoned);
            }
            Some(Err(err)) => {
                tracing::warn!(error = ?err, "failed to write selection reply");
                (x::ATOM_NONE, Answer::Refused)
            }
            None => (x::ATOM_NONE, Answer::Refused),
        };

        let notify = x::SelectionNotifyEvent::new(
            req.time(),
            req.requestor(),
            req.selection(),
            req.target(),
            notify_property,
        );
        self.conn.send_request(&x::SendEvent {
            propagate: false,
            destination: x::SendEventDest::Window(req.requestor()),
            event_mask: x::EventMask::empty(),
            event: &notify,
        });
        self.conn.flush()?;
        Ok(answer)
    }

    fn intern(&self, name: &str) -> Result<x::Atom, ClipboardError> {
        let cookie = self.conn.send_request(&x::InternAtom {
            only_if_exists: false,
            name: name.as_bytes(),
        });
        Ok(self.conn.wait_for_reply(cookie)?.atom())
    }

    fn atom_name(&self, atom: x::Atom) -> Result<String, ClipboardError> {
        let cookie = self.conn.send_request(&x::GetAtomName { atom });
        Ok(self.conn.wait_for_reply(cookie)?.name().to_utf8().into_owned())
    }

    /// Requests one conversion and waits for the matching notification,
    /// skipping any unrelated events that arrive first.
    fn request(
        &mut self,
        target: x::Atom,
        timeout: Duration,
        wait_slice: Duration,
    ) -> Result<Transfer, ClipboardError> {
        self.conn.send_request(&x::DeleteProperty {
            window: self.window,
            property: self.property,
        });
        self.conn.send_request(&x::ConvertSelection {
            requestor: self.window,
            selection: self.selection,
            target,
            property: self.property,
            time: x::CURRENT_TIME,
        });
        self.conn.flush()?;

        let deadline = deadline_after(timeout);
        let mut notified = None;
        EventLoop::new(&mut *self, wait_slice).run_until(
            deadline,
            &CancelToken::new(),
            |session, event| match event {
                xcb::Event::X(x::Event::SelectionNotify(ev))
                    if ev.requestor() == session.window && ev.selection() == session.selection =>
                {
                    notified = Some(ev.property());
                    Ok(ControlFlow::Quit)
                }
                _ => {
                    tracing::trace!("skipping unrelated event while converting");
                    Ok(ControlFlow::Continue)
                }
            },
        )?;

        let Some(property) = notified else {
            return Ok(Transfer::TimedOut);
        };
        if property == x::ATOM_NONE {
            return Ok(Transfer::Refused);
        }

        let cookie = self.conn.send_request(&x::GetProperty {
            delete: false,
            window: self.window,
            property,
            r#type: x::ATOM_ANY,
            long_offset: 0,
            long_length: u32::MAX,
        });
        let reply = self.conn.wait_for_reply(cookie)?;
        let format = reply.format();
        let bytes = match format {
            8 => reply.value::<u8>().to_vec(),
            16 => reply
                .value::<u16>()
                .iter()
                .flat_map(|v| v.to_ne_bytes())
                .collect(),
            32 => reply
                .value::<u32>()
                .iter()
                .flat_map(|v| v.to_ne_bytes())
                .collect(),
            _ => Vec::new(),
        };
        let encoding = reply.r#type();
        let atoms = if encoding == x::ATOM_ATOM && format == 32 {
            reply.value::<x::Atom>().to_vec()
        } else {
            Vec::new()
        };

        // Leave nothing behind on our window.
        self.conn.send_request(&x::DeleteProperty {
            window: self.window,
            property,
        });
        self.conn.flush()?;

        Ok(Transfer::Data {
            encoding,
            format,
            bytes,
            atoms,
        })
    }
}

impl EventSource for Session {
    type Event = xcb::Event;
    type Error = ClipboardError;

    fn wait(&mut self, timeout: Duration) -> Result<bool, ClipboardError> {
        self.conn.flush()?;
        // SAFETY: the connection owns this descriptor and outlives the borrow.
        let fd = unsafe { BorrowedFd::borrow_raw(self.conn.as_raw_fd()) };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(ready) => Ok(ready > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(errno) => Err(io::Error::from(errno).into()),
        }
    }

    fn next(&mut self) -> Result<Option<xcb::Event>, ClipboardError> {
        loop {
            match self.conn.poll_for_event() {
                Ok(event) => return Ok(event),
                // Errors for unchecked requests (a notify sent to a window
                // that just closed) are not fatal to the session.
                Err(xcb::Error::Protocol(err)) => {
                    tracing::debug!(error = ?err, "ignoring asynchronous protocol error");
                }
                Err(xcb::Error::Connection(err)) => return Err(err.into()),
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.conn.send_request(&x::DestroyWindow {
            window: self.window,
        });
        let _ = self.conn.flush();
    }
}

pub(super) fn copy(
    config: &ClipboardConfig,
    payload: &[u8],
    duration: Duration,
    cancel: &CancelToken,
) -> Result<CopyReport, ClipboardError> {
    let mut session = Session::open(config)?;
    session.acquire()?;

    let deadline = deadline_after(duration);
    let mut report = CopyReport::default();
    let exit = EventLoop::new(&mut session, config.wait_slice()).run_until(
        deadline,
        cancel,
        |session, event| {
            match event {
                xcb::Event::X(x::Event::SelectionRequest(req)) => {
                    match session.answer(&req, payload)? {
                        Answer::Served => {
                            report.served += 1;
                            tracing::debug!(requested = ?req.target(), "served selection request");
                        }
                        Answer::Refused => {
                            report.refused += 1;
                            tracing::debug!(requested = ?req.target(), "refused selection request");
                        }
                        Answer::Abandoned | Answer::Ignored => {}
                    }
                }
                xcb::Event::X(x::Event::SelectionClear(ev))
                    if ev.selection() == session.selection =>
                {
                    if !report.ownership_lost {
                        tracing::info!(selection = %session.selection_name, "selection taken by another client");
                    }
                    report.ownership_lost = true;
                }
                _ => {}
            }
            Ok(ControlFlow::Continue)
        },
    )?;
    report.cancelled = exit == LoopExit::Cancelled;
    tracing::info!(
        served = report.served,
        refused = report.refused,
        cancelled = report.cancelled,
        "stopped serving selection"
    );
    Ok(report)
}

pub(super) fn paste(config: &ClipboardConfig) -> Result<Option<Vec<u8>>, ClipboardError> {
    let mut session = Session::open(config)?;
    for encoding in session.atoms.request_order() {
        match session.request(encoding, config.paste_timeout(), config.wait_slice())? {
            Transfer::Data {
                encoding: received,
                format: 8,
                bytes,
                ..
            } if session.atoms.accepts(received) => {
                tracing::debug!(len = bytes.len(), "pasted selection");
                return Ok(Some(bytes));
            }
            Transfer::Data {
                encoding: received,
                ..
            } => {
                if received == session.incr {
                    tracing::warn!("owner offered an incremental transfer, which is not supported");
                } else {
                    tracing::debug!(requested = ?encoding, received = ?received, "owner answered in a non-text encoding");
                }
            }
            Transfer::Refused => {
                tracing::debug!(requested = ?encoding, "conversion refused");
            }
            Transfer::TimedOut => {
                // An owner that ignores one request will ignore the next.
                tracing::debug!(requested = ?encoding, "no answer from selection owner");
                break;
            }
        }
    }
    Ok(None)
}

pub(super) fn targets(config: &ClipboardConfig) -> Result<Vec<String>, ClipboardError> {
    let mut session = Session::open(config)?;
    let target = session.atoms.targets;
    match session.request(target, config.paste_timeout(), config.wait_slice())? {
        Transfer::Data { atoms, .. } => atoms
            .into_iter()
            .map(|atom| session.atom_name(atom))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

pub(super) fn convert(config: &ClipboardConfig, target: &str) -> Result<Conversion, ClipboardError> {
    let mut session = Session::open(config)?;
    let atom = session.intern(target)?;
    Ok(
        match session.request(atom, config.paste_timeout(), config.wait_slice())? {
            Transfer::Data {
                encoding,
                format,
                bytes,
                ..
            } => Conversion::Data {
                encoding: session.atom_name(encoding)?,
                format,
                bytes,
            },
            Transfer::Refused => Conversion::Refused,
            Transfer::TimedOut => Conversion::TimedOut,
        },
    )
}
