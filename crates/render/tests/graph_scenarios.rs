//! End-to-end scenarios: program text through evaluation, GraphDef
//! construction, codec round-trip, and rasterisation, against an
//! in-memory corpus.

use strata_chart::{Layout, LineStyle, Theme, TimeSeq, codec};
use strata_core::builder::GraphOptions;
use strata_core::index::MemoryIndex;
use strata_core::model::context::{DataError, EvalContext};
use strata_core::model::series::{TimeSeries, tags};
use strata_render::render_request;

const STEP: i64 = 60_000;
/// 2011-12-25T00:00Z, the start of a one-week window.
const WEEK_START: i64 = 1_324_771_200_000;
const WEEK_END: i64 = WEEK_START + 7 * 86_400_000;

fn week_ctx() -> EvalContext {
    EvalContext::new(WEEK_START, WEEK_END, STEP, chrono_tz::UTC).unwrap()
}

/// Streams-per-second corpus: cluster `a` runs two nodes at 20k each and
/// spikes to 30k each for one day mid-week, so only its group sum crosses
/// the 50k threshold, and only during the spike.
fn sps_corpus() -> MemoryIndex {
    let steps = ((WEEK_END - WEEK_START) / STEP) as usize;
    let spike_start = steps / 2;
    let spike_end = spike_start + 1_440; // one day of minutes

    let mut node = vec![20_000.0; steps];
    for v in &mut node[spike_start..spike_end] {
        *v = 30_000.0;
    }
    let b = vec![15_000.0; steps];

    MemoryIndex::new(vec![
        TimeSeries::new(
            tags(&[("name", "sps"), ("nf.cluster", "a"), ("nf.node", "i-1")]),
            TimeSeq::new(WEEK_START, STEP, node.clone()).unwrap(),
        ),
        TimeSeries::new(
            tags(&[("name", "sps"), ("nf.cluster", "a"), ("nf.node", "i-2")]),
            TimeSeq::new(WEEK_START, STEP, node).unwrap(),
        ),
        TimeSeries::new(
            tags(&[("name", "sps"), ("nf.cluster", "b"), ("nf.node", "i-3")]),
            TimeSeq::new(WEEK_START, STEP, b).unwrap(),
        ),
    ])
}

const S1_PROGRAM: &str = "name,sps,:eq,(,nf.cluster,),:by,:sum,50000,:gt,:vspan,40,:alpha,\
                          triggered,:legend,name,sps,:eq,(,nf.cluster,),:by,input,:legend,\
                          50000,:const,threshold,:legend";

#[test]
fn s1_grouped_sum_with_threshold_vspan() {
    let ctx = week_ctx();
    let index = sps_corpus();
    let rendered = render_request(S1_PROGRAM, &ctx, &GraphOptions::default(), &index).unwrap();
    let graph = &rendered.graph_def;

    assert_eq!(graph.plots.len(), 1);
    let plot = &graph.plots[0];

    // Two group-by lines labelled "input" plus the constant threshold.
    assert_eq!(plot.lines.len(), 3);
    assert!(plot.lines[..2].iter().all(|l| l.label == "input"));
    assert!(plot.lines.iter().all(|l| l.style == LineStyle::Line));
    let threshold = &plot.lines[2];
    assert_eq!(threshold.label, "threshold");
    assert!(threshold.data.values().iter().all(|&v| v == 50_000.0));

    // Only cluster a's group sum crosses 50k, and only during the spike
    // day, so exactly one band comes out.
    let steps = (WEEK_END - WEEK_START) / STEP;
    let spike_start = WEEK_START + steps / 2 * STEP;
    let spike_end = spike_start + 1_440 * STEP;
    assert_eq!(plot.vspans.len(), 1);
    let span = &plot.vspans[0];
    assert_eq!((span.start, span.end), (spike_start, spike_end));
    assert_eq!(span.alpha, 40);
    assert_eq!(span.label, "triggered");

    // Alignment invariant: every line covers exactly the graph window.
    for line in &plot.lines {
        assert_eq!(line.data.start(), graph.start_time);
        assert_eq!(
            line.data.start() + line.data.step() * line.data.len() as i64,
            graph.end_time
        );
    }
}

#[test]
fn s2_stack_with_negative_values() {
    let ctx = EvalContext::new(0, 5 * STEP, STEP, chrono_tz::UTC).unwrap();
    let index = MemoryIndex::new(
        [
            ("h1", [2.0, 2.0, 2.0, 2.0, 2.0]),
            ("h3", [-1.0, -1.0, -1.0, -1.0, -1.0]),
            ("h2", [3.0, 3.0, 3.0, 3.0, 3.0]),
        ]
        .into_iter()
        .map(|(host, values)| {
            TimeSeries::new(
                tags(&[("name", "cpu"), ("host", host)]),
                TimeSeq::new(0, STEP, values.to_vec()).unwrap(),
            )
        })
        .collect(),
    );

    let rendered = render_request(
        "name,cpu,:eq,(,host,),:by,:stack",
        &ctx,
        &GraphOptions::default(),
        &index,
    )
    .unwrap();
    let plot = &rendered.graph_def.plots[0];

    // Hosts arrive sorted by group tuple and all render stacked.
    let labels: Vec<&str> = plot.lines.iter().map(|l| l.label.as_str()).collect();
    assert_eq!(labels, vec!["host=h1", "host=h2", "host=h3"]);
    assert!(plot.lines.iter().all(|l| l.style == LineStyle::Stack));

    // Positive side stacks to 2+3, negative side to -1, independently.
    assert_eq!(plot.value_range(), (-1.0, 5.0));
}

#[test]
fn s3_multi_axis_layout() {
    let ctx = EvalContext::new(0, 5 * STEP, STEP, chrono_tz::UTC).unwrap();
    let index = MemoryIndex::new(vec![
        TimeSeries::new(
            tags(&[("name", "requests")]),
            TimeSeq::new(0, STEP, vec![100.0; 5]).unwrap(),
        ),
        TimeSeries::new(
            tags(&[("name", "latency")]),
            TimeSeq::new(0, STEP, vec![0.25; 5]).unwrap(),
        ),
    ]);
    let options = GraphOptions {
        layout: Layout::Axes,
        ..GraphOptions::default()
    };
    let rendered = render_request(
        "name,requests,:eq,:sum,0,:axis,name,latency,:eq,:avg,1,:axis",
        &ctx,
        &options,
        &index,
    )
    .unwrap();
    let graph = &rendered.graph_def;

    assert_eq!(graph.plots.len(), 2);
    assert_eq!(graph.plots[0].lines.len(), 1);
    assert_eq!(graph.plots[1].lines.len(), 1);
    // Y ranges stay independent per plot.
    assert_eq!(graph.plots[0].value_range(), (99.5, 100.5));
    assert_eq!(graph.plots[1].value_range(), (0.25 - 0.5, 0.75));
}

#[test]
fn s4_empty_result_still_renders() {
    let ctx = week_ctx();
    let index = sps_corpus();
    let rendered = render_request(
        "name,nonexistent,:eq,:sum",
        &ctx,
        &GraphOptions::default(),
        &index,
    )
    .unwrap();
    assert_eq!(rendered.graph_def.plots.len(), 1);
    assert!(rendered.graph_def.plots[0].lines.is_empty());
    assert_eq!(&rendered.png_bytes[1..4], b"PNG");
}

#[test]
fn s5_codec_roundtrip_and_rerender() {
    let ctx = week_ctx();
    let index = sps_corpus();
    let rendered = render_request(S1_PROGRAM, &ctx, &GraphOptions::default(), &index).unwrap();

    // JSON round-trip, plain and gzipped.
    let json = codec::encode_string(&rendered.graph_def).unwrap();
    let back = codec::decode_from(json.as_bytes()).unwrap();
    assert_eq!(back, rendered.graph_def);

    let dir = std::env::temp_dir();
    let gz = dir.join("strata-s5.json.gz");
    codec::write_file(&rendered.graph_def, &gz).unwrap();
    assert_eq!(codec::read_file(&gz).unwrap(), rendered.graph_def);
    let _ = std::fs::remove_file(&gz);

    // Re-rendering the decoded GraphDef is byte-identical.
    assert_eq!(strata_render::render(&back).unwrap(), rendered.png_bytes);
}

#[test]
fn s6_unaligned_context_is_rejected() {
    assert!(matches!(
        EvalContext::new(10, 60_000, 60_000, chrono_tz::UTC),
        Err(DataError::UnalignedBoundary { bound: 10, .. })
    ));
}

#[test]
fn whole_request_is_deterministic() {
    let ctx = week_ctx();
    let index = sps_corpus();
    let options = GraphOptions {
        theme: Theme::Dark,
        title: Some("streams per second".into()),
        ..GraphOptions::default()
    };
    let first = render_request(S1_PROGRAM, &ctx, &options, &index).unwrap();
    let second = render_request(S1_PROGRAM, &ctx, &options, &index).unwrap();
    assert_eq!(first.png_bytes, second.png_bytes);
    assert_eq!(first.graph_def, second.graph_def);
}

#[test]
fn single_step_context_yields_one_sample() {
    let ctx = EvalContext::new(0, STEP, STEP, chrono_tz::UTC).unwrap();
    let index = MemoryIndex::new(vec![TimeSeries::new(
        tags(&[("name", "sps")]),
        TimeSeq::new(0, STEP, vec![42.0]).unwrap(),
    )]);
    let rendered =
        render_request("name,sps,:eq,:sum", &ctx, &GraphOptions::default(), &index).unwrap();
    let line = &rendered.graph_def.plots[0].lines[0];
    assert_eq!(line.data.len(), 1);
    assert_eq!(&rendered.png_bytes[1..4], b"PNG");
}
