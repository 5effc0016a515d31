//! Scroll corrections for timeline mutations.
//!
//! Not a state machine: a pure function from "what kind of mutation just
//! happened" to "what scroll correction to apply", run once per mutation
//! after layout. All geometry goes through the [`Viewport`] trait, so the
//! logic is unit-testable without any real rendering surface.

use skiff_proto::MessageId;

use crate::timeline::TimelineMutation;

/// Read-only view geometry the planner consults.
///
/// Offsets are in presentation units (pixels, rows) measured from the top
/// of the content; the planner only ever compares and subtracts them.
pub trait Viewport {
    /// Current scroll position (distance from content top to viewport top).
    fn scroll_offset(&self) -> f64;

    /// Height of the visible area.
    fn viewport_height(&self) -> f64;

    /// Total height of the rendered content.
    fn content_height(&self) -> f64;

    /// Offset of a message row from the content top. `None` if the row is
    /// not currently rendered.
    fn offset_of(&self, id: MessageId) -> Option<f64>;

    /// Message rows fully below the bottom edge of the viewport.
    fn rows_below_viewport(&self) -> usize;
}

/// Geometry captured immediately before a mutation is applied.
///
/// Prepends need the pre-mutation position of the anchor row; everything
/// else needs the pre-mutation distance from the bottom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSnapshot {
    /// Scroll position before the mutation.
    pub scroll_offset: f64,
    /// Viewport height before the mutation.
    pub viewport_height: f64,
    /// Content height before the mutation.
    pub content_height: f64,
    /// Pre-mutation offset of the anchor row, if it was rendered.
    pub anchor_offset: Option<f64>,
}

impl ViewportSnapshot {
    /// Capture the current geometry, recording the anchor row's offset.
    pub fn capture(viewport: &dyn Viewport, anchor: Option<MessageId>) -> Self {
        Self {
            scroll_offset: viewport.scroll_offset(),
            viewport_height: viewport.viewport_height(),
            content_height: viewport.content_height(),
            anchor_offset: anchor.and_then(|id| viewport.offset_of(id)),
        }
    }

    /// Distance between the viewport bottom and the content bottom.
    fn distance_from_bottom(&self) -> f64 {
        (self.content_height - self.scroll_offset - self.viewport_height).max(0.0)
    }
}

/// Planner thresholds.
#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// How close to the bottom still counts as "at the bottom".
    pub near_bottom_slack: f64,
    /// Rows that must be scrolled out of view before the jump-to-latest
    /// affordance appears for live appends.
    pub affordance_min_rows: usize,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self { near_bottom_slack: 48.0, affordance_min_rows: 3 }
    }
}

/// The correction the presentation layer should apply after layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollCorrection {
    /// Pin the view to the newest message.
    JumpToBottom,
    /// Center the given message in the viewport.
    CenterOn(MessageId),
    /// Restore the anchor row to its pre-mutation viewport position.
    AnchorTo {
        /// The anchor row.
        id: MessageId,
        /// Its offset before the mutation.
        previous_offset: f64,
    },
    /// Shift the scroll position by the content-height delta (fallback when
    /// the anchor row cannot be located).
    CompensateHeight {
        /// Height added above the viewport.
        delta: f64,
    },
    /// Animate to the bottom.
    SmoothToBottom,
    /// Leave the position untouched.
    None,
}

/// A correction plus whether to surface the jump-to-latest affordance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPlan {
    /// The scroll correction to apply.
    pub correction: ScrollCorrection,
    /// Whether to show the jump-to-latest affordance.
    pub show_jump_to_latest: bool,
}

/// Plan the correction for a timeline mutation.
///
/// `pinned_to_latest` is the post-mutation timeline state; `before` is the
/// geometry captured just before the mutation, `after` the geometry after
/// layout.
pub fn plan_scroll(
    mutation: TimelineMutation,
    pinned_to_latest: bool,
    before: &ViewportSnapshot,
    after: &dyn Viewport,
    config: &AnchorConfig,
) -> ScrollPlan {
    match mutation {
        TimelineMutation::InitialLoaded => {
            ScrollPlan { correction: ScrollCorrection::JumpToBottom, show_jump_to_latest: false }
        },

        TimelineMutation::ContextLoaded { target } => ScrollPlan {
            correction: ScrollCorrection::CenterOn(target),
            show_jump_to_latest: !pinned_to_latest,
        },

        TimelineMutation::OlderPrepended { anchor, added } => {
            if added == 0 {
                return ScrollPlan {
                    correction: ScrollCorrection::None,
                    show_jump_to_latest: false,
                };
            }

            let correction = match (anchor, before.anchor_offset) {
                (Some(id), Some(previous_offset)) => {
                    ScrollCorrection::AnchorTo { id, previous_offset }
                },
                _ => ScrollCorrection::CompensateHeight {
                    delta: after.content_height() - before.content_height,
                },
            };

            ScrollPlan { correction, show_jump_to_latest: false }
        },

        TimelineMutation::NewerAppended { .. } => ScrollPlan {
            correction: ScrollCorrection::None,
            show_jump_to_latest: !pinned_to_latest,
        },

        TimelineMutation::LiveAppended => {
            if before.distance_from_bottom() <= config.near_bottom_slack {
                return ScrollPlan {
                    correction: ScrollCorrection::SmoothToBottom,
                    show_jump_to_latest: false,
                };
            }

            ScrollPlan {
                correction: ScrollCorrection::None,
                show_jump_to_latest: after.rows_below_viewport() >= config.affordance_min_rows,
            }
        },

        TimelineMutation::LiveBuffered { .. } => {
            ScrollPlan { correction: ScrollCorrection::None, show_jump_to_latest: true }
        },

        TimelineMutation::Noop => {
            ScrollPlan { correction: ScrollCorrection::None, show_jump_to_latest: false }
        },
    }
}

/// Plan the correction for a view-density (row-height) change.
///
/// Re-pins to the bottom so shrinking or growing rows never read as the
/// view drifting upward.
pub fn plan_density_change() -> ScrollPlan {
    ScrollPlan { correction: ScrollCorrection::JumpToBottom, show_jump_to_latest: false }
}
