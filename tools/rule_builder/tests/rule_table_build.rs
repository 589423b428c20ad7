use rule_builder::build_from_str;
use rule_format::{DataFilter, InternalTarget, RuleAction, StatusSelector};

#[test]
fn rule_table_matches_configuration() {
    let yaml = r#"- name: My Backingtracks
  description: Play audio file matching <data1>-playback.mp3
  status: programchange
  channel: 16
  command: plaympeg %(data1)03i-playback.mp3
- name: My Lead Sheets
  description: Open PDF matching <data2>-sheet.pdf
  status: controllerchange
  channel: 16
  data: 14
  command: evince %(data2)03i-sheet.pdf
- name: Scene select
  status: controllerchange
  data: "14 3"
  command: scene --id 3
- [Clock, Timing clock tick, "248", null, null, "tick %(status)d"]
- name: Camera
  status: controllerchange
  channel: 16
  data: 14
  command: internal camera
- name: Typo
  status: contollerchange
  command: echo never
"#;

    let output = build_from_str(yaml).expect("build");
    assert_eq!(output.table.len(), 5);
    assert_eq!(output.skipped, vec![5]);

    let controllers = output.table.bucket(0xB0).expect("controller bucket");
    let names: Vec<_> = controllers.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["My Lead Sheets", "Scene select", "Camera"]);
    assert_eq!(controllers[1].data, DataFilter::Pair(14, 3));
    assert_eq!(controllers[1].channel, None);
    assert_eq!(
        controllers[2].action,
        RuleAction::Internal(InternalTarget::Camera)
    );

    let clock = output.table.bucket(0xF8).expect("clock bucket");
    assert_eq!(clock[0].name, "Clock");
    assert_eq!(clock[0].description, "Timing clock tick");
    assert_eq!(clock[0].status, StatusSelector::Raw(0xF8));
    assert_eq!(clock[0].command.source(), "tick %(status)d");

    let program = &output.table.bucket(0xC0).expect("program bucket")[0];
    assert_eq!(program.command.source(), "plaympeg %(data1)03i-playback.mp3");

    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].path, "rules[5].status");
}
