use approx::assert_abs_diff_eq;
use gpa_forecast::{
    GpaBand, ModelArtifact, NormalizationMode, PipelineConfig, PipelineError, Predictor,
    SchemaError, read_table,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

const MATH_ENG_MODEL: &str = r#"
format_version = 1
subject_cols = ["MATH", "ENG", "GPA"]

[model]
kind = "linear"
intercept = 2.5
coefficients = [1.0, 0.4]
"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write test file");
    path
}

fn predictor_from(model: &Path) -> Predictor {
    let artifact = ModelArtifact::load(model).expect("load model");
    Predictor::new(Arc::new(artifact), PipelineConfig::default()).expect("build predictor")
}

fn constant_model(intercept: f64) -> String {
    format!(
        "format_version = 1\nsubject_cols = [\"MATH\", \"GPA\"]\n\n[model]\nkind = \"linear\"\nintercept = {intercept:?}\ncoefficients = [0.0]\n"
    )
}

#[test]
fn csv_file_to_report_end_to_end() {
    let dir = tempdir().unwrap();
    let model = write(&dir, "model.toml", MATH_ENG_MODEL);
    let marks = write(
        &dir,
        "marks.csv",
        "Emplid,Name,Course,Mark\nS1,Alice,MATH,80\nS1,Alice,ENG,60\nS2,Bob,MATH,40\n",
    );

    let report = predictor_from(&model)
        .run(&read_table(&marks).unwrap())
        .unwrap();
    assert_eq!(report.len(), 2);

    let rows = report.rows();
    assert_eq!(rows[0].student_name, "Alice");
    assert_abs_diff_eq!(rows[0].display_score(), 2.833, epsilon = 1e-12);
    assert_eq!(rows[0].band.label(), "2.5–3.0");
    assert_eq!(rows[1].student_name, "Bob");
    assert_abs_diff_eq!(rows[1].display_score(), 2.167, epsilon = 1e-12);
    assert_eq!(rows[1].band.label(), "2.0–2.5");
    assert!(rows.iter().all(|r| r.eligible));
}

#[test]
fn tsv_input_with_extra_columns_and_leading_zero_ids() {
    let dir = tempdir().unwrap();
    let model = write(&dir, "model.toml", MATH_ENG_MODEL);
    let marks = write(
        &dir,
        "marks.tsv",
        "Term\tEmplid\tName\tCourse\tMark\n2024\t00412\tAlice\tMATH\t80\n2024\t00413\tBob\tMATH\t40\n",
    );

    let report = predictor_from(&model)
        .run(&read_table(&marks).unwrap())
        .unwrap();
    assert_eq!(report.rows()[0].student_id, "00412");
    assert_eq!(report.rows()[1].student_id, "00413");
}

#[test]
fn duplicate_course_rows_keep_the_first_mark() {
    let dir = tempdir().unwrap();
    let model = write(&dir, "model.toml", MATH_ENG_MODEL);
    let marks = write(
        &dir,
        "marks.csv",
        "Emplid,Name,Course,Mark\nS1,Alice,MATH,80\nS1,Alice,MATH,20\nS2,Bob,MATH,40\n",
    );

    let report = predictor_from(&model)
        .run(&read_table(&marks).unwrap())
        .unwrap();
    assert_eq!(report.len(), 2);
    // With the first mark kept the MATH mean is 60, so Alice sits at +1/3.
    assert_abs_diff_eq!(report.rows()[0].score, 2.5 + 1.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn missing_mark_is_filled_with_the_global_median() {
    let dir = tempdir().unwrap();
    let model = write(&dir, "model.toml", MATH_ENG_MODEL);
    let marks = write(
        &dir,
        "marks.csv",
        "Emplid,Name,Course,Mark\nS1,Alice,MATH,80\nS2,Bob,MATH,40\nS3,Cy,MATH,absent\n",
    );

    let report = predictor_from(&model)
        .run(&read_table(&marks).unwrap())
        .unwrap();
    assert_eq!(report.len(), 3);
    assert_abs_diff_eq!(report.rows()[2].score, 2.5, epsilon = 1e-12);
}

#[test]
fn score_on_the_threshold_is_eligible() {
    let dir = tempdir().unwrap();
    let marks = write(&dir, "marks.csv", "Emplid,Name,Course,Mark\nS1,Alice,MATH,70\n");
    let raw = read_table(&marks).unwrap();

    let on = write(&dir, "on.toml", &constant_model(2.0));
    let row = predictor_from(&on).run(&raw).unwrap().rows()[0].clone();
    assert_eq!(row.band, GpaBand::From2_0To2_5);
    assert_eq!(row.band.label(), "2.0–2.5");
    assert!(row.eligible);

    let below = write(&dir, "below.toml", &constant_model(1.9999));
    let row = predictor_from(&below).run(&raw).unwrap().rows()[0].clone();
    assert_eq!(row.band.label(), "1.5–2.0");
    assert!(!row.eligible);
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempdir().unwrap();
    let model = write(&dir, "model.toml", MATH_ENG_MODEL);
    let marks = write(
        &dir,
        "marks.csv",
        "Emplid,Name,Course,Mark\nS1,Alice,MATH,80\nS1,Alice,ENG,60\nS2,Bob,MATH,40\nS3,Cy,ENG,72\n",
    );
    let predictor = predictor_from(&model);
    let raw = read_table(&marks).unwrap();

    let first = predictor.run(&raw).unwrap();
    let second = predictor.run(&raw).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[test]
fn renamed_columns_follow_the_config_file() {
    let dir = tempdir().unwrap();
    let model = write(&dir, "model.toml", MATH_ENG_MODEL);
    let config = write(
        &dir,
        "config.toml",
        "[input]\nstudent_id = \"ID\"\nstudent_name = \"Student\"\ncourse_code = \"Subject\"\nmark = \"Score\"\n",
    );
    let marks = write(
        &dir,
        "marks.csv",
        "ID,Student,Subject,Score\nS1,Alice,MATH,80\nS2,Bob,MATH,40\n",
    );

    let artifact = Arc::new(ModelArtifact::load(&model).unwrap());
    let predictor = Predictor::new(artifact, PipelineConfig::load(&config).unwrap()).unwrap();
    let report = predictor.run(&read_table(&marks).unwrap()).unwrap();
    assert_eq!(report.len(), 2);

    let default_predictor = predictor_from(&model);
    match default_predictor.run(&read_table(&marks).unwrap()) {
        Err(PipelineError::Schema(SchemaError::ColumnNotFound(column))) => {
            assert_eq!(column, "Emplid")
        }
        other => panic!("Expected a missing column error, got {other:?}"),
    }
}

#[test]
fn reference_normalization_uses_the_artifact_means() {
    let dir = tempdir().unwrap();
    let model = write(
        &dir,
        "model.toml",
        &MATH_ENG_MODEL.replace("[model]", "[reference_means]\nMATH = 50.0\nENG = 40.0\n\n[model]"),
    );
    let config = write(&dir, "config.toml", "normalization = \"reference\"\n");
    let marks = write(&dir, "marks.csv", "Emplid,Name,Course,Mark\nS1,Alice,MATH,80\n");

    let config = PipelineConfig::load(&config).unwrap();
    assert_eq!(config.normalization, NormalizationMode::Reference);
    let artifact = Arc::new(ModelArtifact::load(&model).unwrap());
    let report = Predictor::new(artifact, config)
        .unwrap()
        .run(&read_table(&marks).unwrap())
        .unwrap();

    // MATH: (80 - 50) / 50 = 0.6; ENG missing, imputed to its mean.
    assert_abs_diff_eq!(report.rows()[0].score, 2.5 + 0.6, epsilon = 1e-12);
}
