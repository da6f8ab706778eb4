//! Built-in Node Types
//!
//! Canonical definitions for the node types that ship with the crate. These
//! mirror the document types accepted by the iHMP metadata store.
//!
//! ## Hierarchy
//!
//! - **project** → **study** → **subject** → **visit** → **sample**
//! - sample → preps (`host_seq_prep`, `wgs_dna_prep`, `16s_dna_prep`, `host_assay_prep`)
//! - preps → raw sequence sets → derived sets and analysis products
//!
//! ## Usage
//!
//! Call `builtin_types()` to get every definition, or use
//! [`SchemaRegistry::builtin`](super::SchemaRegistry::builtin).

use super::{AttributeSpec, LinkageSpec, NodeType, SubtypeRule, ValueKind};
use regex::Regex;

pub const CENTERS: &[&str] = &[
    "Virginia Commonwealth University",
    "Broad Institute",
    "Stanford University / Jackson Laboratory",
    "Stanford University",
    "Jackson Laboratory",
];

pub const STUDIES: &[&str] = &["preg_preterm", "ibd", "prediabetes"];

pub const SEQUENCE_FORMATS: &[&str] = &["fasta", "fastq"];

pub const VARIANT_FORMATS: &[&str] = &["vcf", "txt"];

pub const SEQUENCE_TYPES: &[&str] = &["peptide", "nucleotide"];

pub const OMICS_SUBTYPES: &[&str] = &["host", "microbiome"];

/// Remote directory segments for every abundance matrix type
pub const MATRIX_REMOTE_DIRS: &[(&str, &[&str])] = &[
    ("16s_community", &["genome", "microbiome", "16s", "analysis", "hmqcp"]),
    ("wgs_community", &["genome", "microbiome", "wgs", "analysis", "hmscp"]),
    ("wgs_functional", &["genome", "microbiome", "wgs", "analysis", "hmmrc"]),
    ("microb_proteomic", &["proteome", "microbiome", "analysis"]),
    ("microb_lipidomic", &["lipidome", "microbiome", "analysis"]),
    ("microb_cytokine", &["cytokine", "microbiome", "analysis"]),
    ("microb_metabolome", &["metabolome", "microbiome", "analysis"]),
    (
        "microb_metatranscriptome",
        &["metatranscriptome", "microbiome", "analysis"],
    ),
    ("host_proteomic", &["proteome", "host", "analysis"]),
    ("host_lipidomic", &["lipidome", "host", "analysis"]),
    ("host_cytokine", &["cytokine", "host", "analysis"]),
    ("host_metabolome", &["metabolome", "host", "analysis"]),
    ("host_transcriptome", &["transcriptome", "host", "analysis"]),
];

/// Remote directory segments for a matrix type, if the type is known
pub fn matrix_remote_dirs(matrix_type: &str) -> Option<&'static [&'static str]> {
    MATRIX_REMOTE_DIRS
        .iter()
        .find(|(name, _)| *name == matrix_type)
        .map(|(_, dirs)| *dirs)
}

fn req(name: &str, kind: ValueKind) -> AttributeSpec {
    AttributeSpec::required(name, kind)
}

fn opt(name: &str, kind: ValueKind) -> AttributeSpec {
    AttributeSpec::optional(name, kind)
}

fn tags() -> AttributeSpec {
    req("tags", ValueKind::StringList)
}

fn comment(required: bool) -> AttributeSpec {
    let spec = if required {
        req("comment", ValueKind::String)
    } else {
        opt("comment", ValueKind::String)
    };
    spec.max_len(512)
}

fn study() -> AttributeSpec {
    req("study", ValueKind::String).one_of(STUDIES)
}

fn count(name: &str, required: bool) -> AttributeSpec {
    let spec = if required {
        req(name, ValueKind::Integer)
    } else {
        opt(name, ValueKind::Integer)
    };
    spec.non_negative()
}

fn past_date(name: &str) -> AttributeSpec {
    opt(name, ValueKind::Date).not_in_future()
}

/// Attributes shared by every node that documents a data file
fn file_attributes(formats: Option<&[&str]>) -> Vec<AttributeSpec> {
    let format = match formats {
        Some(values) => req("format", ValueKind::String).one_of(values),
        None => req("format", ValueKind::String),
    };

    vec![
        req("checksums", ValueKind::Object)
            .with_keys(&["md5"])
            .describe("Checksums for the data file; must include md5"),
        format,
        req("format_doc", ValueKind::String),
        count("size", true),
        req("urls", ValueKind::StringList),
        opt("private_files", ValueKind::Boolean),
    ]
}

/// Attributes shared by the raw sequence set types
fn raw_seq_attributes() -> Vec<AttributeSpec> {
    let mut specs = file_attributes(Some(SEQUENCE_FORMATS));
    specs.extend([
        comment(true),
        count("exp_length", true),
        req("seq_model", ValueKind::String),
        opt("sequence_type", ValueKind::String).one_of(SEQUENCE_TYPES),
        study(),
        tags(),
    ]);
    specs
}

/// Attributes shared by the nucleic acid prep types
fn seq_prep_attributes(taxon: &Regex) -> Vec<AttributeSpec> {
    vec![
        comment(true),
        req("lib_layout", ValueKind::String),
        req("lib_selection", ValueKind::String),
        req("ncbi_taxon_id", ValueKind::String).matching(taxon.clone()),
        req("prep_id", ValueKind::String),
        req("sequencing_center", ValueKind::String),
        req("sequencing_contact", ValueKind::String),
        count("storage_duration", true),
        tags(),
        opt("adapters", ValueKind::String),
        opt("findex", ValueKind::String),
        opt("rindex", ValueKind::String),
        count("frag_size", false),
        count("lib_size", false),
        opt("srs_id", ValueKind::String).min_len(3),
        opt("mims", ValueKind::Object),
    ]
}

/// Get every built-in node type definition
pub fn builtin_types() -> Result<Vec<NodeType>, regex::Error> {
    let taxon = Regex::new(r"^[0-9]+$")?;

    let project = NodeType::new("project", "Top-level funded project")
        .attributes([
            req("name", ValueKind::String),
            req("description", ValueKind::String),
            opt("funding_agency", ValueKind::String),
            opt("mixs", ValueKind::Object),
            tags(),
        ]);

    let study_type = NodeType::new("study", "A study within a project")
        .attributes([
            req("name", ValueKind::String),
            req("description", ValueKind::String),
            req("center", ValueKind::String).one_of(CENTERS),
            req("contact", ValueKind::String).min_len(3).max_len(128),
            opt("srp_id", ValueKind::String),
            opt("bp_id", ValueKind::String),
            tags(),
        ])
        .linkage(LinkageSpec::optional("part_of", &["project"]))
        .linkage(LinkageSpec::optional("subset_of", &["study"]))
        .require_any_linkage(&["part_of", "subset_of"])
        .subtype(SubtypeRule::controlled(STUDIES));

    let subject = NodeType::new("subject", "A study participant")
        .attributes([
            req("rand_subject_id", ValueKind::String),
            req("gender", ValueKind::String).one_of(&["male", "female", "unknown"]),
            opt("race", ValueKind::String),
            tags(),
        ])
        .linkage(LinkageSpec::required("participates_in", &["study"]))
        .with_private_data();

    let visit = NodeType::new("visit", "A clinical visit by a subject")
        .attributes([
            req("visit_id", ValueKind::String),
            req("visit_number", ValueKind::Integer).range(Some(1.0), None),
            count("interval", true),
            past_date("date"),
            opt("clinic_id", ValueKind::String),
            tags(),
        ])
        .linkage(LinkageSpec::required("by", &["subject"]))
        .with_private_data();

    let sample = NodeType::new("sample", "A biological sample collected during a visit")
        .attributes([
            req("fma_body_site", ValueKind::String),
            req("mixs", ValueKind::Object),
            opt("body_site", ValueKind::String),
            opt("supersite", ValueKind::String),
            tags(),
        ])
        .linkage(LinkageSpec::required("collected_during", &["visit"]))
        .with_private_data();

    let host_seq_prep = NodeType::new("host_seq_prep", "Host sequencing library prep")
        .attributes(seq_prep_attributes(&taxon))
        .linkage(LinkageSpec::required("prepared_from", &["sample"]))
        .subtype(SubtypeRule::fixed("host"));

    let wgs_dna_prep = NodeType::new("wgs_dna_prep", "Whole genome shotgun DNA prep")
        .attributes(seq_prep_attributes(&taxon))
        .linkage(LinkageSpec::required("prepared_from", &["sample"]))
        .subtype(SubtypeRule::fixed("wgs"));

    let sixteen_s_dna_prep = NodeType::new("16s_dna_prep", "16S rRNA DNA prep")
        .attributes(seq_prep_attributes(&taxon))
        .attribute(opt("primer", ValueKind::String))
        .linkage(LinkageSpec::required("prepared_from", &["sample"]))
        .subtype(SubtypeRule::fixed("16s"));

    let host_assay_prep = NodeType::new("host_assay_prep", "Host assay prep for omics analyses")
        .attributes([
            comment(true),
            req("sample_name", ValueKind::String),
            req("title", ValueKind::String),
            req("center", ValueKind::String),
            req("contact", ValueKind::String),
            req("prep_id", ValueKind::String),
            req("experiment_type", ValueKind::String),
            study(),
            tags(),
            count("storage_duration", false),
            opt("pride_id", ValueKind::String),
            opt("species", ValueKind::String),
            opt("cell_type", ValueKind::String),
            opt("tissue", ValueKind::String),
            opt("reference", ValueKind::String),
            opt("protocol_name", ValueKind::String),
            opt("short_label", ValueKind::String),
        ])
        .linkage(LinkageSpec::required("prepared_from", &["sample"]))
        .subtype(SubtypeRule::inferred("study"));

    let host_wgs_raw_seq_set =
        NodeType::new("host_wgs_raw_seq_set", "Raw host whole genome sequences")
            .attributes(raw_seq_attributes())
            .linkage(LinkageSpec::required("sequenced_from", &["host_seq_prep"]))
            .subtype(SubtypeRule::inferred("study"))
            .with_raw_file();

    let host_transcriptomics_raw_seq_set = NodeType::new(
        "host_transcriptomics_raw_seq_set",
        "Raw host transcriptome sequences",
    )
    .attributes(raw_seq_attributes())
    .linkage(LinkageSpec::required("sequenced_from", &["host_seq_prep"]))
    .subtype(SubtypeRule::inferred("study"))
    .with_raw_file();

    let host_epigenetics_raw_seq_set = NodeType::new(
        "host_epigenetics_raw_seq_set",
        "Raw host epigenetic sequences",
    )
    .attributes(raw_seq_attributes())
    .attribute(req("assay_type", ValueKind::String))
    .linkage(LinkageSpec::required("sequenced_from", &["host_seq_prep"]))
    .subtype(SubtypeRule::inferred("study"))
    .with_raw_file();

    let sixteen_s_raw_seq_set = NodeType::new("16s_raw_seq_set", "Raw 16S sequences")
        .attributes(raw_seq_attributes())
        .linkage(LinkageSpec::required("sequenced_from", &["16s_dna_prep"]))
        .subtype(SubtypeRule::inferred("study"))
        .with_raw_file();

    let wgs_raw_seq_set = NodeType::new("wgs_raw_seq_set", "Raw whole genome shotgun sequences")
        .attributes(raw_seq_attributes())
        .linkage(LinkageSpec::required("sequenced_from", &["wgs_dna_prep"]))
        .subtype(SubtypeRule::inferred("study"))
        .with_raw_file();

    let sixteen_s_trimmed_seq_set =
        NodeType::new("16s_trimmed_seq_set", "Quality trimmed 16S sequences")
            .attributes(file_attributes(Some(SEQUENCE_FORMATS)))
            .attributes([
                comment(true),
                opt("sequence_type", ValueKind::String).one_of(SEQUENCE_TYPES),
                study(),
                tags(),
            ])
            .linkage(LinkageSpec::required("computed_from", &["16s_raw_seq_set"]))
            .subtype(SubtypeRule::fixed("16s"))
            .with_raw_file();

    let wgs_assembled_seq_set =
        NodeType::new("wgs_assembled_seq_set", "Assembled whole genome shotgun contigs")
            .attributes(file_attributes(Some(SEQUENCE_FORMATS)))
            .attributes([
                req("assembler", ValueKind::String),
                req("assembly_name", ValueKind::String),
                comment(true),
                req("sequence_type", ValueKind::String).one_of(SEQUENCE_TYPES),
                study(),
                tags(),
            ])
            .linkage(LinkageSpec::required("computed_from", &["wgs_raw_seq_set"]))
            .subtype(SubtypeRule::inferred("study"))
            .with_raw_file();

    let annotation = NodeType::new("annotation", "Functional annotation of sequences")
        .attributes(file_attributes(None))
        .attributes([
            req("annotation_pipeline", ValueKind::String),
            req("orf_process", ValueKind::String),
            opt("annotation_source", ValueKind::String),
            comment(false),
            past_date("date"),
            study(),
            tags(),
        ])
        .linkage(LinkageSpec::required(
            "computed_from",
            &["wgs_assembled_seq_set", "wgs_raw_seq_set"],
        ))
        .subtype(SubtypeRule::inferred("study"))
        .with_raw_file();

    let clustered_seq_set = NodeType::new("clustered_seq_set", "Clustered sequences")
        .attributes(file_attributes(Some(SEQUENCE_FORMATS)))
        .attributes([
            req("clustering_process", ValueKind::String),
            comment(true),
            req("sequence_type", ValueKind::String).one_of(SEQUENCE_TYPES),
            past_date("date"),
            opt("sop", ValueKind::String),
            study(),
            tags(),
        ])
        .linkage(LinkageSpec::required("computed_from", &["annotation"]))
        .subtype(SubtypeRule::inferred("study"))
        .with_raw_file();

    let matrix_types: Vec<&str> = MATRIX_REMOTE_DIRS.iter().map(|(name, _)| *name).collect();
    let abundance_matrix = NodeType::new("abundance_matrix", "Abundance matrix from an analysis")
        .attributes(file_attributes(None))
        .attributes([
            comment(true),
            req("matrix_type", ValueKind::String).one_of(&matrix_types),
            opt("sop", ValueKind::String),
            study(),
            tags(),
        ])
        .linkage(LinkageSpec::required(
            "computed_from",
            &[
                "16s_raw_seq_set",
                "16s_trimmed_seq_set",
                "wgs_raw_seq_set",
                "wgs_assembled_seq_set",
                "annotation",
                "host_wgs_raw_seq_set",
                "host_transcriptomics_raw_seq_set",
                "proteome_nonpride",
                "metabolome",
                "cytokine",
            ],
        ))
        .subtype(SubtypeRule::inferred("matrix_type"))
        .with_raw_file();

    let host_variant_call = NodeType::new("host_variant_call", "Variant calls against a reference")
        .attributes(file_attributes(Some(VARIANT_FORMATS)))
        .attributes([
            comment(true),
            req("reference", ValueKind::String),
            req("variant_calling_process", ValueKind::String),
            past_date("date"),
            opt("sop", ValueKind::String),
            study(),
            tags(),
        ])
        .linkage(LinkageSpec::required("computed_from", &["host_wgs_raw_seq_set"]))
        .subtype(SubtypeRule::inferred("study"))
        .with_raw_file();

    let omics_file = |name: &str, description: &str, rule: SubtypeRule| {
        NodeType::new(name, description)
            .attributes([
                req("checksums", ValueKind::Object).with_keys(&["md5"]),
                req("urls", ValueKind::StringList),
                opt("format", ValueKind::String),
                opt("format_doc", ValueKind::String),
                comment(false),
                opt("private_files", ValueKind::Boolean),
                study(),
                tags(),
            ])
            .linkage(LinkageSpec::required("derived_from", &["host_assay_prep"]))
            .subtype(rule)
            .with_raw_file()
    };

    let cytokine = omics_file("cytokine", "Cytokine measurements", SubtypeRule::inferred("study"));
    let metabolome = omics_file(
        "metabolome",
        "Metabolomic profile",
        SubtypeRule::controlled(OMICS_SUBTYPES),
    );

    let proteome_nonpride = NodeType::new("proteome_nonpride", "Proteome not deposited in PRIDE")
        .attributes([
            req("analyzer", ValueKind::String),
            req("detector", ValueKind::String),
            req("instrument_name", ValueKind::String),
            req("data_processing_protocol", ValueKind::String),
            req("processing_method", ValueKind::String),
            req("exp_description", ValueKind::String),
            req("raw_url", ValueKind::StringList),
            opt("peak_url", ValueKind::StringList),
            opt("result_url", ValueKind::StringList),
            opt("other_url", ValueKind::StringList),
            comment(false),
            past_date("date"),
            study(),
            tags(),
        ])
        .linkage(LinkageSpec::required("derived_from", &["host_assay_prep"]))
        .subtype(SubtypeRule::controlled(OMICS_SUBTYPES))
        .with_raw_file();

    Ok(vec![
        project,
        study_type,
        subject,
        visit,
        sample,
        host_seq_prep,
        wgs_dna_prep,
        sixteen_s_dna_prep,
        host_assay_prep,
        host_wgs_raw_seq_set,
        host_transcriptomics_raw_seq_set,
        host_epigenetics_raw_seq_set,
        sixteen_s_raw_seq_set,
        wgs_raw_seq_set,
        sixteen_s_trimmed_seq_set,
        wgs_assembled_seq_set,
        annotation,
        clustered_seq_set,
        abundance_matrix,
        host_variant_call,
        cytokine,
        metabolome,
        proteome_nonpride,
    ])
}
