use std::path::PathBuf;

use super::util::{escape_drawtext_text, escape_font_path};
use super::{FfmpegCompiler, Instruction, VideoDimensions};
use crate::video::error::StudioError;
use crate::video::timeline::{
    ClipId, OverlayPosition, OverlayUpdate, SourceLocation, Timeline, TrimBound,
};

fn compiler() -> FfmpegCompiler {
    FfmpegCompiler::new(VideoDimensions::new(1280, 720), 48, None)
}

fn clip_source(name: &str) -> SourceLocation {
    SourceLocation::File(PathBuf::from(format!("/media/{name}.mp4")))
}

fn timeline_with(durations: &[f64]) -> (Timeline, Vec<ClipId>) {
    let mut timeline = Timeline::new();
    let ids = durations
        .iter()
        .enumerate()
        .map(|(idx, d)| timeline.append_clip(clip_source(&format!("c{idx}")), format!("c{idx}"), *d))
        .collect();
    (timeline, ids)
}

fn count(program: &super::CompiledProgram, pred: fn(&Instruction) -> bool) -> usize {
    program.instructions.iter().filter(|i| pred(i)).count()
}

#[test]
fn program_shape_matches_clips_and_overlays() {
    let (mut timeline, _) = timeline_with(&[10.0, 8.0, 4.0]);
    timeline.add_overlay("First", OverlayPosition::Top).unwrap();
    timeline.add_overlay("Second", OverlayPosition::Bottom).unwrap();

    let program = compiler().compile(&timeline).unwrap();

    assert_eq!(count(&program, |i| matches!(i, Instruction::TrimClip { .. })), 3);
    assert_eq!(count(&program, |i| matches!(i, Instruction::Concat { .. })), 1);
    assert_eq!(count(&program, |i| matches!(i, Instruction::DrawText { .. })), 2);
    assert_eq!(count(&program, |i| matches!(i, Instruction::MapOutput { .. })), 1);
    assert_eq!(program.instructions.len(), 7);

    let texts: Vec<&str> = program
        .instructions
        .iter()
        .filter_map(|i| match i {
            Instruction::DrawText { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["First", "Second"]);

    assert_eq!(
        program.instructions.last(),
        Some(&Instruction::MapOutput {
            video: "overlay_out_1".to_string(),
            audio: "concat_a".to_string(),
        })
    );
    assert_eq!(program.composed_duration, 22.0);
}

#[test]
fn overlays_chain_from_concat_output() {
    let (mut timeline, _) = timeline_with(&[10.0]);
    timeline.add_overlay("a", OverlayPosition::Center).unwrap();
    timeline.add_overlay("b", OverlayPosition::Center).unwrap();

    let program = compiler().compile(&timeline).unwrap();
    let chain: Vec<(&str, &str)> = program
        .instructions
        .iter()
        .filter_map(|i| match i {
            Instruction::DrawText {
                video_in, video_out, ..
            } => Some((video_in.as_str(), video_out.as_str())),
            _ => None,
        })
        .collect();

    assert_eq!(
        chain,
        vec![("concat_v", "overlay_out_0"), ("overlay_out_0", "overlay_out_1")]
    );
}

#[test]
fn overlays_keep_insertion_order_not_time_order() {
    let (mut timeline, _) = timeline_with(&[20.0]);
    let late = timeline.add_overlay("late", OverlayPosition::Top).unwrap();
    timeline
        .update_overlay(late, OverlayUpdate::StartTime(15.0))
        .unwrap();
    timeline.add_overlay("early", OverlayPosition::Top).unwrap();

    let filter = compiler().compile(&timeline).unwrap().filter_complex();
    let late_pos = filter.find(r"text=\'late\'").unwrap();
    let early_pos = filter.find(r"text=\'early\'").unwrap();
    assert!(late_pos < early_pos);
    assert!(filter.contains("enable='between(t,15.000000,20.000000)'"));
}

#[test]
fn compiling_twice_is_identical() {
    let (mut timeline, ids) = timeline_with(&[10.0, 8.0]);
    timeline.set_trim(ids[0], TrimBound::Start, 1.5).unwrap();
    timeline.add_overlay("Hello", OverlayPosition::Center).unwrap();

    let compiler = compiler();
    let first = compiler.compile(&timeline).unwrap();
    let second = compiler.compile(&timeline).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_ffmpeg_args(), second.to_ffmpeg_args());
}

#[test]
fn program_is_a_snapshot_of_the_timeline() {
    let (mut timeline, _) = timeline_with(&[10.0]);
    let program = compiler().compile(&timeline).unwrap();

    timeline.append_clip(clip_source("late"), "late", 5.0);
    timeline.add_overlay("late", OverlayPosition::Top).unwrap();

    assert_eq!(program.inputs.len(), 1);
    assert_eq!(program.composed_duration, 10.0);
    assert!(!program.filter_complex().contains("drawtext"));
}

#[test]
fn concat_order_respects_timeline_order() {
    let (mut timeline, ids) = timeline_with(&[10.0, 10.0, 10.0]);
    timeline.set_trim(ids[0], TrimBound::Start, 5.0).unwrap();
    timeline.set_trim(ids[1], TrimBound::Start, 1.0).unwrap();
    timeline.set_trim(ids[2], TrimBound::Start, 3.0).unwrap();

    let program = compiler().compile(&timeline).unwrap();
    let filter = program.filter_complex();

    let concat_pos = filter
        .find("[v0][a0][v1][a1][v2][a2]concat=n=3:v=1:a=1[concat_v][concat_a]")
        .unwrap();
    let before_concat = &filter[..concat_pos];

    let pos_start_5 = before_concat.find("[0:v]trim=start=5.000000").unwrap();
    let pos_start_1 = before_concat.find("[1:v]trim=start=1.000000").unwrap();
    let pos_start_3 = before_concat.find("[2:v]trim=start=3.000000").unwrap();
    assert!(pos_start_5 < pos_start_1);
    assert!(pos_start_1 < pos_start_3);

    let names: Vec<&str> = program.inputs.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["input0.mp4", "input1.mp4", "input2.mp4"]);
}

#[test]
fn clips_are_normalized_to_the_canonical_frame() {
    let (timeline, _) = timeline_with(&[6.0]);
    let filter = compiler().compile(&timeline).unwrap().filter_complex();

    assert!(filter.contains(
        "[0:v]trim=start=0.000000:end=6.000000,setpts=PTS-STARTPTS,scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2:black,setsar=1[v0]"
    ));
    assert!(filter.contains(
        "[0:a]atrim=start=0.000000:end=6.000000,asetpts=PTS-STARTPTS,aformat=sample_rates=48000:channel_layouts=stereo[a0]"
    ));
}

#[test]
fn inverted_trim_compiles_to_zero_length_segment() {
    let (mut timeline, ids) = timeline_with(&[10.0, 8.0]);
    timeline.set_trim(ids[0], TrimBound::Start, 9.0).unwrap();
    timeline.set_trim(ids[0], TrimBound::End, 4.0).unwrap();

    let program = compiler().compile(&timeline).unwrap();

    assert_eq!(count(&program, |i| matches!(i, Instruction::TrimClip { .. })), 2);
    assert!(
        program
            .filter_complex()
            .contains("[0:v]trim=start=9.000000:end=9.000000,")
    );
    assert_eq!(program.composed_duration, 8.0);
}

#[test]
fn trims_outside_the_source_are_clamped() {
    let (mut timeline, ids) = timeline_with(&[10.0]);
    timeline.set_trim(ids[0], TrimBound::Start, -2.0).unwrap();
    timeline.set_trim(ids[0], TrimBound::End, 15.0).unwrap();

    let program = compiler().compile(&timeline).unwrap();
    assert!(
        program
            .filter_complex()
            .contains("trim=start=0.000000:end=10.000000,")
    );
    assert_eq!(program.composed_duration, 10.0);
}

#[test]
fn without_overlays_concat_output_is_mapped() {
    let (timeline, _) = timeline_with(&[10.0, 8.0]);
    let program = compiler().compile(&timeline).unwrap();

    assert!(program.filter_complex().ends_with("concat=n=2:v=1:a=1[concat_v][concat_a]"));

    let args = program.to_ffmpeg_args();
    let maps: Vec<&str> = args
        .windows(2)
        .filter(|w| w[0] == "-map")
        .map(|w| w[1].as_str())
        .collect();
    assert_eq!(maps, vec!["[concat_v]", "[concat_a]"]);
}

#[test]
fn empty_timeline_is_rejected() {
    let timeline = Timeline::new();
    assert!(matches!(
        compiler().compile(&timeline),
        Err(StudioError::Validation(_))
    ));
}

#[test]
fn args_list_inputs_then_graph_then_output() {
    let (timeline, _) = timeline_with(&[10.0, 8.0]);
    let args = compiler().compile(&timeline).unwrap().to_ffmpeg_args();

    assert_eq!(&args[..4], &["-i", "input0.mp4", "-i", "input1.mp4"]);
    assert_eq!(args[4], "-filter_complex");
    assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
    assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
    assert_eq!(args.last().unwrap(), "output.mp4");
}

#[test]
fn drawtext_uses_position_window_and_style() {
    let (mut timeline, _) = timeline_with(&[10.0, 8.0]);
    timeline.add_overlay("Hi", OverlayPosition::Bottom).unwrap();

    let compiler = FfmpegCompiler::new(
        VideoDimensions::new(1280, 720),
        64,
        Some(PathBuf::from("/fonts/Inter Bold.ttf")),
    );
    let filter = compiler.compile(&timeline).unwrap().filter_complex();

    assert!(filter.contains(
        r"[concat_v]drawtext=fontfile=\'/fonts/Inter Bold.ttf\':text=\'Hi\':x=(w-text_w)/2:y=h-text_h-20:fontsize=64:fontcolor=white:box=1:boxcolor=black@0.5:boxborderw=5:enable='between(t,0.000000,18.000000)'[overlay_out_0]"
    ));
}

#[test]
fn overlay_text_is_escaped_for_the_filtergraph() {
    assert_eq!(escape_drawtext_text("Hello"), r"\'Hello\'");
    assert_eq!(escape_drawtext_text("a;b"), r"\'a\;b\'");
    assert_eq!(escape_drawtext_text("a:b,c"), r"\'a:b\,c\'");
    assert_eq!(escape_drawtext_text("[x]"), r"\'\[x\]\'");
    assert_eq!(escape_drawtext_text("50%"), r"\'50\\%\'");
    assert_eq!(escape_drawtext_text("it's"), r"\'it\'\\\'\'s\'");
}

#[test]
fn reserved_characters_cannot_break_the_graph() {
    let (mut timeline, _) = timeline_with(&[5.0]);
    timeline
        .add_overlay("x[out];[0:v]null", OverlayPosition::Top)
        .unwrap();

    let filter = compiler().compile(&timeline).unwrap().filter_complex();
    // Only the real separators between instructions remain unescaped.
    let unescaped_semicolons = filter
        .char_indices()
        .filter(|(idx, ch)| *ch == ';' && !filter[..*idx].ends_with('\\'))
        .count();
    assert_eq!(unescaped_semicolons, 3);
}

#[test]
fn font_path_is_escaped_like_option_values() {
    assert_eq!(
        escape_font_path(&PathBuf::from("/simple/path.ttf")),
        r"\'/simple/path.ttf\'"
    );
    assert_eq!(
        escape_font_path(&PathBuf::from("/path/with spaces:colon/file.ttf")),
        r"\'/path/with spaces:colon/file.ttf\'"
    );
    assert_eq!(
        escape_font_path(&PathBuf::from("/path/with'quote/file.ttf")),
        r"\'/path/with\'\\\'\'quote/file.ttf\'"
    );
    assert_eq!(
        escape_font_path(&PathBuf::from("/fonts/a,b[1].ttf")),
        r"\'/fonts/a\,b\[1\].ttf\'"
    );
}

#[test]
fn quote_in_font_path_stays_inside_the_filter() {
    let (mut timeline, _) = timeline_with(&[5.0]);
    timeline.add_overlay("Hi", OverlayPosition::Top).unwrap();
    let compiler = FfmpegCompiler::new(
        VideoDimensions::new(1280, 720),
        48,
        Some(PathBuf::from("/fonts/it's;bold.ttf")),
    );

    let filter = compiler.compile(&timeline).unwrap().filter_complex();
    let unescaped_semicolons = filter
        .char_indices()
        .filter(|(idx, ch)| *ch == ';' && !filter[..*idx].ends_with('\\'))
        .count();
    assert_eq!(unescaped_semicolons, 3);
    assert!(!filter.contains("fontfile='"));
}
