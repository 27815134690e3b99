//! Mixer composition graph.
//!
//! A mixer always has exactly N slots, where N is the configured participant
//! count. Slots are filled in order by real publisher streams; the rest get a
//! synthetic black video plus silent audio source, so the graph shape depends
//! only on N.
//!
//! Engine input numbering follows slot order. A real slot contributes one
//! input (`K:v` and `K:a` from the same stream). A synthetic slot contributes
//! two (`K:v` from the color source, `K+1:a` from the null audio source).
//!
//! ```text
//! N=4, 1 real publisher:
//!
//!   input 0  udp://...        slot 0  [0:v] [0:a]
//!   input 1  color=...        slot 1  [1:v]
//!   input 2  anullsrc=...             [2:a]
//!   input 3  color=...        slot 2  [3:v]
//!   input 4  anullsrc=...             [4:a]
//!   input 5  color=...        slot 3  [5:v]
//!   input 6  anullsrc=...             [6:a]
//! ```

use super::ffmpeg::OUTPUT_CODEC_ARGS;
use super::EngineCommand;
use crate::config::MAX_LAYOUT_SLOTS;
use crate::ports::SinkAddress;

/// Output geometry of a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// xstack layout for `slots` equally sized tiles.
///
/// 1: single frame, 2: side by side, 3: two on top and one below,
/// 4: 2x2 grid.
pub fn xstack_layout(slots: usize) -> Option<&'static str> {
    match slots {
        1 => Some("0_0"),
        2 => Some("0_0|w0_0"),
        3 => Some("0_0|w0_0|0_h0"),
        4 => Some("0_0|w0_0|0_h0|w0_h0"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Publisher(SinkAddress),
    Blank,
}

/// Engine input streams for one slot.
struct SlotStreams {
    video: usize,
    audio: usize,
}

/// A point-in-time mixer invocation for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixPlan {
    canvas: Canvas,
    slots: Vec<Slot>,
    output: SinkAddress,
}

impl MixPlan {
    /// Build a plan with `slot_count` slots.
    ///
    /// `publishers` is taken in order; entries beyond the slot count are
    /// dropped. The slot count is clamped to the supported layouts (1..=4).
    pub fn new(
        canvas: Canvas,
        slot_count: usize,
        publishers: Vec<SinkAddress>,
        output: SinkAddress,
    ) -> Self {
        let slot_count = slot_count.clamp(1, MAX_LAYOUT_SLOTS);
        let mut slots: Vec<Slot> = publishers
            .into_iter()
            .take(slot_count)
            .map(Slot::Publisher)
            .collect();
        slots.resize(slot_count, Slot::Blank);

        Self {
            canvas,
            slots,
            output,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slots fed by a publisher stream.
    pub fn real_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Publisher(_)))
            .count()
    }

    /// Slots fed by the blank video and silent audio sources.
    pub fn synthetic_slots(&self) -> usize {
        self.slot_count() - self.real_slots()
    }

    pub fn output(&self) -> &SinkAddress {
        &self.output
    }

    fn slot_streams(&self) -> Vec<SlotStreams> {
        let mut next_input = 0;
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Publisher(_) => {
                    let streams = SlotStreams {
                        video: next_input,
                        audio: next_input,
                    };
                    next_input += 1;
                    streams
                }
                Slot::Blank => {
                    let streams = SlotStreams {
                        video: next_input,
                        audio: next_input + 1,
                    };
                    next_input += 2;
                    streams
                }
            })
            .collect()
    }

    /// Engine input arguments, in input-index order.
    fn input_args(&self) -> Vec<String> {
        let Canvas {
            width,
            height,
            frame_rate,
        } = self.canvas;

        let mut args = Vec::new();
        for slot in &self.slots {
            match slot {
                Slot::Publisher(sink) => {
                    args.push("-i".to_string());
                    args.push(sink.input_url());
                }
                Slot::Blank => {
                    args.extend(
                        [
                            "-f".to_string(),
                            "lavfi".to_string(),
                            "-i".to_string(),
                            format!("color=size={width}x{height}:rate={frame_rate}:color=black"),
                            "-f".to_string(),
                            "lavfi".to_string(),
                            "-i".to_string(),
                            "anullsrc=channel_layout=stereo:sample_rate=48000".to_string(),
                        ],
                    );
                }
            }
        }
        args
    }

    /// The `-filter_complex` description. Produces `[vout]` and `[aout]`.
    pub fn filter_graph(&self) -> String {
        let Canvas { width, height, .. } = self.canvas;
        let streams = self.slot_streams();
        let count = streams.len();

        let mut chains: Vec<String> = streams
            .iter()
            .enumerate()
            .map(|(slot, s)| {
                format!(
                    "[{}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
                     pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black[v{slot}]",
                    s.video
                )
            })
            .collect();

        let video_labels: String = (0..count).map(|slot| format!("[v{slot}]")).collect();
        let audio_labels: String = streams.iter().map(|s| format!("[{}:a]", s.audio)).collect();

        match xstack_layout(count) {
            Some(layout) if count > 1 => {
                chains.push(format!(
                    "{video_labels}xstack=inputs={count}:layout={layout}:fill=black[vout]"
                ));
                chains.push(format!(
                    "{audio_labels}amix=inputs={count}:normalize=0[aout]"
                ));
            }
            _ => {
                chains.push(format!("{video_labels}null[vout]"));
                chains.push(format!("{audio_labels}anull[aout]"));
            }
        }

        chains.join(";")
    }

    /// Full engine argument list.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.input_args();
        args.push("-filter_complex".to_string());
        args.push(self.filter_graph());
        args.extend(
            ["-map", "[vout]", "-map", "[aout]"]
                .iter()
                .map(ToString::to_string),
        );
        args.extend(OUTPUT_CODEC_ARGS.iter().map(ToString::to_string));
        args.push(self.output.output_url());
        args
    }

    pub fn command(&self) -> EngineCommand {
        EngineCommand::mixer(self.args())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ports::{Addressing, PortWindow, SinkMode};
    use common::types::{PublisherId, SessionId};

    const CANVAS: Canvas = Canvas {
        width: 640,
        height: 360,
        frame_rate: 30,
    };

    fn addressing() -> Addressing {
        Addressing::new(
            PortWindow::new(5000, 2000).unwrap(),
            PortWindow::new(7000, 1000).unwrap(),
            SinkMode::Unicast,
            "239.10.10.1",
        )
    }

    fn plan(slots: usize, publishers: &[&str]) -> MixPlan {
        let addressing = addressing();
        let session = SessionId::from("r1");
        let sinks = publishers
            .iter()
            .map(|p| addressing.publisher_sink(&session, &PublisherId::from(*p)))
            .collect();
        MixPlan::new(CANVAS, slots, sinks, addressing.mix_sink(&session))
    }

    fn count_inputs(args: &[String]) -> usize {
        args.iter().filter(|a| *a == "-i").count()
    }

    #[test]
    fn test_layouts() {
        assert_eq!(xstack_layout(1), Some("0_0"));
        assert_eq!(xstack_layout(2), Some("0_0|w0_0"));
        assert_eq!(xstack_layout(3), Some("0_0|w0_0|0_h0"));
        assert_eq!(xstack_layout(4), Some("0_0|w0_0|0_h0|w0_h0"));
        assert_eq!(xstack_layout(0), None);
        assert_eq!(xstack_layout(5), None);
    }

    #[test]
    fn test_slots_fill_with_blanks() {
        for publishers in 0..=4 {
            let names: Vec<String> = (0..publishers).map(|i| format!("p{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let plan = plan(4, &refs);

            assert_eq!(plan.slot_count(), 4);
            assert_eq!(plan.real_slots(), publishers);
            assert_eq!(plan.synthetic_slots(), 4 - publishers);

            // Real slots take one engine input, blank slots take two
            let args = plan.args();
            assert_eq!(count_inputs(&args), publishers + 2 * (4 - publishers));
        }
    }

    #[test]
    fn test_excess_publishers_truncated_in_order() {
        let plan = plan(2, &["first", "second", "third", "fourth"]);
        assert_eq!(plan.slot_count(), 2);
        assert_eq!(plan.real_slots(), 2);
        assert_eq!(plan.synthetic_slots(), 0);

        let addressing = addressing();
        let session = SessionId::from("r1");
        let args = plan.args();
        assert_eq!(count_inputs(&args), 2);
        for kept in ["first", "second"] {
            let url = addressing
                .publisher_sink(&session, &PublisherId::from(kept))
                .input_url();
            assert!(args.contains(&url), "{kept} should be an input");
        }
    }

    #[test]
    fn test_one_publisher_four_slots_graph() {
        let graph = plan(4, &["p1"]).filter_graph();

        let expected = [
            "[0:v]scale=640:360:force_original_aspect_ratio=decrease,pad=640:360:(ow-iw)/2:(oh-ih)/2:black[v0]",
            "[1:v]scale=640:360:force_original_aspect_ratio=decrease,pad=640:360:(ow-iw)/2:(oh-ih)/2:black[v1]",
            "[3:v]scale=640:360:force_original_aspect_ratio=decrease,pad=640:360:(ow-iw)/2:(oh-ih)/2:black[v2]",
            "[5:v]scale=640:360:force_original_aspect_ratio=decrease,pad=640:360:(ow-iw)/2:(oh-ih)/2:black[v3]",
            "[v0][v1][v2][v3]xstack=inputs=4:layout=0_0|w0_0|0_h0|w0_h0:fill=black[vout]",
            "[0:a][2:a][4:a][6:a]amix=inputs=4:normalize=0[aout]",
        ]
        .join(";");

        assert_eq!(graph, expected);
    }

    #[test]
    fn test_full_room_uses_one_input_per_slot() {
        let graph = plan(3, &["a", "b", "c"]).filter_graph();

        assert!(graph.contains("[0:v]scale"));
        assert!(graph.contains("[1:v]scale"));
        assert!(graph.contains("[2:v]scale"));
        assert!(graph.contains("xstack=inputs=3:layout=0_0|w0_0|0_h0:fill=black[vout]"));
        assert!(graph.ends_with("[0:a][1:a][2:a]amix=inputs=3:normalize=0[aout]"));
    }

    #[test]
    fn test_single_slot_passes_through() {
        let graph = plan(1, &["solo"]).filter_graph();

        assert!(graph.contains("[v0]null[vout]"));
        assert!(graph.contains("[0:a]anull[aout]"));
        assert!(!graph.contains("xstack"));
        assert!(!graph.contains("amix"));
    }

    #[test]
    fn test_slot_count_clamped() {
        assert_eq!(plan(0, &[]).slot_count(), 1);
        assert_eq!(plan(9, &[]).slot_count(), MAX_LAYOUT_SLOTS);
    }

    #[test]
    fn test_blank_source_uses_canvas() {
        let canvas = Canvas {
            width: 320,
            height: 180,
            frame_rate: 25,
        };
        let addressing = addressing();
        let plan = MixPlan::new(
            canvas,
            2,
            vec![],
            addressing.mix_sink(&SessionId::from("r1")),
        );
        let args = plan.args();

        assert!(args.contains(&"color=size=320x180:rate=25:color=black".to_string()));
        assert!(args
            .iter()
            .any(|a| a.contains("scale=320:180") && a.contains("pad=320:180")));
    }

    #[test]
    fn test_args_map_outputs_and_target_mix_sink() {
        let plan = plan(4, &["p1", "p2"]);
        let args = plan.args();

        assert!(args.windows(2).any(|w| w == ["-map", "[vout]"]));
        assert!(args.windows(2).any(|w| w == ["-map", "[aout]"]));
        assert!(args.windows(2).any(|w| w == ["-f", "mpegts"]));
        assert_eq!(args.last().unwrap(), &plan.output().output_url());
    }

    #[test]
    fn test_command_does_not_pipe_stdin() {
        let command = plan(4, &[]).command();
        assert!(!command.pipe_stdin);
        assert_eq!(command.purpose, crate::engine::EnginePurpose::Mixer);
    }
}
