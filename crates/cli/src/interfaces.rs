//! Interfaces the CLI binds to describe the server.
//!
//! Only events are described; the CLI sends no requests on these objects,
//! so the request tables stay empty.

use bitflags::bitflags;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use waylink_client::{Connection, ConnectionError, GlobalTemplate};
use waylink_protocol::{Argument, ArgumentKind, Interface, MessageDesc, ObjectId};

pub static WL_SHM: Interface = Interface {
    name: "wl_shm",
    version: 1,
    requests: &[],
    events: &[MessageDesc {
        name: "format",
        signature: &[ArgumentKind::Uint],
    }],
};

pub static WL_SEAT: Interface = Interface {
    name: "wl_seat",
    version: 5,
    requests: &[],
    events: &[
        MessageDesc {
            name: "capabilities",
            signature: &[ArgumentKind::Uint],
        },
        MessageDesc {
            name: "name",
            signature: &[ArgumentKind::Str],
        },
    ],
};

pub static WL_OUTPUT: Interface = Interface {
    name: "wl_output",
    version: 4,
    requests: &[],
    events: &[
        MessageDesc {
            name: "geometry",
            signature: &[
                ArgumentKind::Int,
                ArgumentKind::Int,
                ArgumentKind::Int,
                ArgumentKind::Int,
                ArgumentKind::Int,
                ArgumentKind::Str,
                ArgumentKind::Str,
                ArgumentKind::Int,
            ],
        },
        MessageDesc {
            name: "mode",
            signature: &[
                ArgumentKind::Uint,
                ArgumentKind::Int,
                ArgumentKind::Int,
                ArgumentKind::Int,
            ],
        },
        MessageDesc {
            name: "done",
            signature: &[],
        },
        MessageDesc {
            name: "scale",
            signature: &[ArgumentKind::Int],
        },
        MessageDesc {
            name: "name",
            signature: &[ArgumentKind::Str],
        },
        MessageDesc {
            name: "description",
            signature: &[ArgumentKind::Str],
        },
    ],
};

bitflags! {
    /// `wl_seat.capability` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SeatCapability: u32 {
        const POINTER = 0x1;
        const KEYBOARD = 0x2;
        const TOUCH = 0x4;
    }
}

bitflags! {
    /// `wl_output.mode` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputMode: u32 {
        /// The output is currently using this mode.
        const CURRENT = 0x1;
        const PREFERRED = 0x2;
    }
}

/// Templates for every interface described here.
pub fn templates() -> Vec<GlobalTemplate> {
    vec![
        GlobalTemplate::new(&WL_SHM),
        GlobalTemplate::new(&WL_SEAT),
        GlobalTemplate::new(&WL_OUTPUT),
    ]
}

/// Human-readable facts collected per bound object.
#[derive(Debug, Default)]
pub struct Details {
    lines: BTreeMap<ObjectId, Vec<String>>,
}

impl Details {
    fn push(&mut self, id: ObjectId, line: String) {
        self.lines.entry(id).or_default().push(line);
    }

    /// Lines collected for `id`, in arrival order.
    pub fn lines(&self, id: ObjectId) -> &[String] {
        self.lines.get(&id).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Install handlers on every bound object that record what its events say.
pub fn collect_details(
    conn: &mut Connection,
    details: &Rc<RefCell<Details>>,
) -> Result<(), ConnectionError> {
    let bound: Vec<(ObjectId, &'static str)> = conn
        .globals()
        .advertised()
        .filter_map(|record| {
            let id = record.bound?;
            Some((id, conn.object(id)?.interface().name))
        })
        .collect();

    for (id, interface) in bound {
        let events = match interface {
            "wl_shm" => WL_SHM.events,
            "wl_seat" => WL_SEAT.events,
            "wl_output" => WL_OUTPUT.events,
            _ => continue,
        };
        for (opcode, desc) in (0u16..).zip(events) {
            let sink = Rc::clone(details);
            let event_name = desc.name;
            conn.set_handler(id, opcode, move |_, event| {
                if let Some(line) = describe(event_name, &event.args) {
                    sink.borrow_mut().push(event.sender, line);
                }
                Ok(())
            })?;
        }
    }
    Ok(())
}

/// Render one event; `None` for events that carry nothing worth printing.
pub fn describe(event: &str, args: &[Argument]) -> Option<String> {
    match (event, args) {
        ("format", [Argument::Uint(format)]) => Some(format!("format {}", shm_format(*format))),
        ("capabilities", [Argument::Uint(caps)]) => {
            let caps = SeatCapability::from_bits_truncate(*caps);
            Some(format!("capabilities {}", seat_capabilities(caps)))
        }
        ("name", [Argument::Str(name)]) => Some(format!("name {name:?}")),
        ("description", [Argument::Str(text)]) => Some(format!("description {text:?}")),
        (
            "geometry",
            [
                Argument::Int(x),
                Argument::Int(y),
                Argument::Int(width_mm),
                Argument::Int(height_mm),
                _,
                Argument::Str(make),
                Argument::Str(model),
                _,
            ],
        ) => Some(format!(
            "geometry {x},{y} {width_mm}x{height_mm} mm {make} {model}"
        )),
        (
            "mode",
            [
                Argument::Uint(flags),
                Argument::Int(width),
                Argument::Int(height),
                Argument::Int(refresh),
            ],
        ) => {
            let flags = OutputMode::from_bits_truncate(*flags);
            let current = if flags.contains(OutputMode::CURRENT) {
                " (current)"
            } else {
                ""
            };
            Some(format!(
                "mode {width}x{height} @ {}.{:03} Hz{current}",
                refresh / 1000,
                refresh % 1000
            ))
        }
        ("scale", [Argument::Int(factor)]) => Some(format!("scale {factor}")),
        _ => None,
    }
}

/// Seat capabilities as `pointer|keyboard|touch`.
pub fn seat_capabilities(caps: SeatCapability) -> String {
    if caps.is_empty() {
        return "none".to_string();
    }
    caps.iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect::<Vec<_>>()
        .join("|")
}

/// Shared-memory format code. The two mandatory formats have their own
/// codes; the rest are DRM fourcc values.
pub fn shm_format(format: u32) -> String {
    match format {
        0 => "ARGB8888".to_string(),
        1 => "XRGB8888".to_string(),
        fourcc => {
            let bytes = fourcc.to_le_bytes();
            if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                String::from_utf8_lossy(&bytes).trim_end().to_string()
            } else {
                format!("{fourcc:#010x}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_cover_descriptors() {
        let names: Vec<_> = templates().iter().map(|t| t.interface.name).collect();
        assert_eq!(names, vec!["wl_shm", "wl_seat", "wl_output"]);
        assert_eq!(WL_OUTPUT.event_opcode("description"), Some(5));
    }

    #[test]
    fn test_seat_capabilities() {
        assert_eq!(seat_capabilities(SeatCapability::empty()), "none");
        assert_eq!(
            seat_capabilities(SeatCapability::POINTER | SeatCapability::KEYBOARD),
            "pointer|keyboard"
        );
        assert_eq!(seat_capabilities(SeatCapability::all()), "pointer|keyboard|touch");
        // Unknown bits from newer servers are ignored.
        assert_eq!(
            seat_capabilities(SeatCapability::from_bits_truncate(0x4 | 0x80)),
            "touch"
        );
    }

    #[test]
    fn test_describe_capabilities() {
        assert_eq!(
            describe("capabilities", &[Argument::Uint(0x3)]).as_deref(),
            Some("capabilities pointer|keyboard")
        );
    }

    #[test]
    fn test_shm_format() {
        assert_eq!(shm_format(0), "ARGB8888");
        assert_eq!(shm_format(1), "XRGB8888");
        assert_eq!(shm_format(u32::from_le_bytes(*b"AB24")), "AB24");
        assert_eq!(shm_format(0x0000_0102), "0x00000102");
    }

    #[test]
    fn test_describe_mode() {
        let args = [
            Argument::Uint(0x3),
            Argument::Int(2560),
            Argument::Int(1440),
            Argument::Int(59_951),
        ];
        assert_eq!(
            describe("mode", &args).as_deref(),
            Some("mode 2560x1440 @ 59.951 Hz (current)")
        );

        let preferred_only = [
            Argument::Uint(OutputMode::PREFERRED.bits()),
            Argument::Int(1920),
            Argument::Int(1080),
            Argument::Int(60_000),
        ];
        assert_eq!(
            describe("mode", &preferred_only).as_deref(),
            Some("mode 1920x1080 @ 60.000 Hz")
        );
    }

    #[test]
    fn test_describe_ignores_done() {
        assert_eq!(describe("done", &[]), None);
        assert_eq!(describe("name", &[Argument::Uint(1)]), None);
    }
}
