use schemars::JsonSchema;
use serde::Serialize;
use tracing::{debug, warn};
use view_plugin::message::{FrameId, SurfaceKind};
use view_plugin::FramePort;

/// One rendering region and the frame loaded into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub kind: SurfaceKind,
    pub frame: FrameId,
    /// Full load URL, injected context included.
    pub url: String,
    pub visible: bool,
}

/// How the main view shares the page with the right pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Layout {
    FullWidth,
    Split,
}

/// Holder for a surface kind that can exist at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Slot {
    #[default]
    Absent,
    Present(Surface),
}

impl Slot {
    pub fn surface(&self) -> Option<&Surface> {
        match self {
            Slot::Absent => None,
            Slot::Present(surface) => Some(surface),
        }
    }

    /// Put `surface` in the slot and return whatever it displaced.
    fn replace(&mut self, surface: Surface) -> Option<Surface> {
        match std::mem::replace(self, Slot::Present(surface)) {
            Slot::Absent => None,
            Slot::Present(old) => Some(old),
        }
    }

    fn take(&mut self) -> Option<Surface> {
        match std::mem::take(self) {
            Slot::Absent => None,
            Slot::Present(old) => Some(old),
        }
    }
}

/// What actually renders frames: a webview shell, the stdio bridge, a test.
/// The host calls `load` with the plugin's end of a new frame and `unload`
/// once the frame is gone from the channel.
pub trait FrameLoader: Send + Sync {
    fn load(&self, surface: &Surface, port: FramePort);
    fn unload(&self, surface: &Surface);
}

/// Owns the surfaces of one view. The main surface always exists; every
/// other kind lives in its own [`Slot`], which is how "at most one of each"
/// is kept.
#[derive(Debug, Clone)]
pub struct SurfaceManager {
    main: Surface,
    right_pane: Slot,
    modal: Slot,
    popup: Slot,
}

impl SurfaceManager {
    pub fn new(main: Surface) -> Self {
        Self { main, right_pane: Slot::Absent, modal: Slot::Absent, popup: Slot::Absent }
    }

    pub fn main(&self) -> &Surface {
        &self.main
    }

    fn slot(&self, kind: SurfaceKind) -> Option<&Slot> {
        match kind {
            SurfaceKind::Main => None,
            SurfaceKind::RightPane => Some(&self.right_pane),
            SurfaceKind::Modal => Some(&self.modal),
            SurfaceKind::DocumentDetailPopup => Some(&self.popup),
        }
    }

    fn slot_mut(&mut self, kind: SurfaceKind) -> Option<&mut Slot> {
        match kind {
            SurfaceKind::Main => None,
            SurfaceKind::RightPane => Some(&mut self.right_pane),
            SurfaceKind::Modal => Some(&mut self.modal),
            SurfaceKind::DocumentDetailPopup => Some(&mut self.popup),
        }
    }

    pub fn get(&self, kind: SurfaceKind) -> Option<&Surface> {
        match kind {
            SurfaceKind::Main => Some(&self.main),
            other => self.slot(other).and_then(Slot::surface),
        }
    }

    pub fn is_present(&self, kind: SurfaceKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn find(&self, frame: &FrameId) -> Option<&Surface> {
        self.all().into_iter().find(|s| &s.frame == frame)
    }

    /// Main first, then right pane, modal and popup when present.
    pub fn all(&self) -> Vec<&Surface> {
        let mut out = vec![&self.main];
        out.extend(
            [&self.right_pane, &self.modal, &self.popup]
                .into_iter()
                .filter_map(Slot::surface),
        );
        out
    }

    /// The main view splits while a right pane exists. Animation is the
    /// renderer's business; the state flips here immediately.
    pub fn layout(&self) -> Layout {
        if self.right_pane.surface().is_some() { Layout::Split } else { Layout::FullWidth }
    }

    /// Install a non-main surface. Returns the surface it displaced, which the
    /// caller must tear down.
    pub fn open(&mut self, surface: Surface) -> Option<Surface> {
        let kind = surface.kind;
        let Some(slot) = self.slot_mut(kind) else {
            warn!("refusing to replace the main surface");
            return None;
        };
        let displaced = slot.replace(surface);
        if let Some(old) = &displaced {
            debug!(%kind, frame = %old.frame, "surface replaced");
        }
        displaced
    }

    pub fn close(&mut self, kind: SurfaceKind) -> Option<Surface> {
        let closed = self.slot_mut(kind).and_then(Slot::take);
        if let Some(old) = &closed {
            debug!(%kind, frame = %old.frame, "surface closed");
        }
        closed
    }

    /// Frames that receive opaque messages posted by a frame of `from`:
    /// children talk to the main frame, the main frame talks to its children.
    pub fn paired(&self, from: SurfaceKind) -> Vec<FrameId> {
        match from {
            SurfaceKind::Main => [&self.modal, &self.right_pane]
                .into_iter()
                .filter_map(Slot::surface)
                .map(|s| s.frame.clone())
                .collect(),
            SurfaceKind::Modal | SurfaceKind::RightPane => vec![self.main.frame.clone()],
            SurfaceKind::DocumentDetailPopup => Vec::new(),
        }
    }

    /// Empty every slot, returning what was there.
    pub fn close_all(&mut self) -> Vec<Surface> {
        [SurfaceKind::DocumentDetailPopup, SurfaceKind::Modal, SurfaceKind::RightPane]
            .into_iter()
            .filter_map(|kind| self.close(kind))
            .collect()
    }
}
