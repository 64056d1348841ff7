// crates/aircast-core/src/draw_frame.rs
//
// The composition tree.
//
// A `DrawFrame` is a transform plus one of: nothing (blank), a pixel/audio
// leaf, or an ordered child list. Producers return these, the stage stacks
// them, and the mixers walk them with a `FrameVisitor` that sees
// `push(transform) … visit(leaf) … pop()` in tree order.
//
// Two distinct empties exist on purpose: `DrawFrame::default()` is blank
// ("nothing was produced", so the layer falls back to `last_frame`), while
// `DrawFrame::empty()` is a zero-child list ("produced, and it is
// nothing": a valid frame that composites to transparency).

use crate::frame::ConstFrame;
use crate::transform::FrameTransform;

#[derive(Clone, Debug, Default, PartialEq)]
enum Content {
    #[default]
    Blank,
    Leaf(ConstFrame),
    List(Vec<DrawFrame>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawFrame {
    content:       Content,
    pub transform: FrameTransform,
}

/// Tree walker. `push`/`pop` bracket every node; leaves arrive via `visit`
/// with all ancestor transforms already pushed.
pub trait FrameVisitor {
    fn push(&mut self, transform: &FrameTransform);
    fn visit(&mut self, frame: &ConstFrame);
    fn pop(&mut self);
}

impl DrawFrame {
    /// The canonical empty frame: a list with no children.
    pub fn empty() -> Self {
        Self { content: Content::List(Vec::new()), transform: FrameTransform::default() }
    }

    pub fn from_list(children: Vec<DrawFrame>) -> Self {
        Self { content: Content::List(children), transform: FrameTransform::default() }
    }

    /// True when nothing was produced. A blank frame is the only falsy
    /// frame; `DrawFrame::empty()` is a real (if invisible) frame.
    pub fn is_blank(&self) -> bool {
        matches!(self.content, Content::Blank)
    }

    /// Stack `over` on top of `under`. Two blanks collapse to blank.
    pub fn over(under: DrawFrame, over: DrawFrame) -> DrawFrame {
        if under.is_blank() && over.is_blank() {
            return DrawFrame::default();
        }
        DrawFrame::from_list(vec![under, over])
    }

    /// Key `fill` by `key`'s luminance. Blank on either side yields blank:
    /// a keyed frame with a missing half must not leak the other half.
    pub fn mask(fill: DrawFrame, mut key: DrawFrame) -> DrawFrame {
        if fill.is_blank() || key.is_blank() {
            return DrawFrame::default();
        }
        key.transform.image.is_key = true;
        DrawFrame::from_list(vec![key, fill])
    }

    /// Wrap `inner` in a single-child node carrying the default transform.
    pub fn push(inner: DrawFrame) -> DrawFrame {
        DrawFrame::from_list(vec![inner])
    }

    /// Wrap `inner` in a single-child node carrying `transform`.
    pub fn push_with(inner: DrawFrame, transform: FrameTransform) -> DrawFrame {
        let mut result = DrawFrame::from_list(vec![inner]);
        result.transform = transform;
        result
    }

    /// Strip the outer transform, keeping the content.
    pub fn pop(frame: &DrawFrame) -> DrawFrame {
        DrawFrame { content: frame.content.clone(), transform: FrameTransform::default() }
    }

    /// Zero the frame's audio volume (a paused/still picture stays visible
    /// but must not keep sounding).
    pub fn still(mut frame: DrawFrame) -> DrawFrame {
        frame.transform.audio.volume = 0.0;
        frame
    }

    pub fn accept<V: FrameVisitor>(&self, visitor: &mut V) {
        visitor.push(&self.transform);
        match &self.content {
            Content::Blank => {}
            Content::Leaf(frame) => visitor.visit(frame),
            Content::List(children) => {
                for child in children {
                    child.accept(visitor);
                }
            }
        }
        visitor.pop();
    }

    /// Children of a list node, if this is one.
    pub fn children(&self) -> Option<&[DrawFrame]> {
        match &self.content {
            Content::List(children) => Some(children),
            _ => None,
        }
    }

    pub fn leaf(&self) -> Option<&ConstFrame> {
        match &self.content {
            Content::Leaf(frame) => Some(frame),
            _ => None,
        }
    }
}

impl From<ConstFrame> for DrawFrame {
    fn from(frame: ConstFrame) -> Self {
        if !frame.is_valid() {
            return DrawFrame::default();
        }
        Self { content: Content::Leaf(frame), transform: FrameTransform::default() }
    }
}
