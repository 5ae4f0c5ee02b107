use std::fs;
use std::path::PathBuf;
use std::process::exit;

use structopt::StructOpt;
use xmlkit_model::graph::GraphBuilder;
use xmlkit_model::registry::TypeRegistry;
use xmlkit_model::sample::{EmitOptional, GeneratorPolicy, SampleGenerator};
use xmlkit_syntax::loader::Loader;

#[derive(Debug, StructOpt)]
#[structopt(name = "xmlkit", about = "XML toolkit engines: XSD, Schematron, signatures, JSON")]
enum Cli {
    /// Validate XML instances, against an XSD when one is given or
    /// discoverable via xsi:schemaLocation.
    Validate {
        #[structopt(long, parse(from_os_str))]
        schema: Option<PathBuf>,
        #[structopt(parse(from_os_str))]
        xml: Vec<PathBuf>,
    },
    /// Run Schematron rules against XML instances.
    Schematron {
        #[structopt(parse(from_os_str))]
        rules: PathBuf,
        #[structopt(parse(from_os_str))]
        xml: Vec<PathBuf>,
    },
    /// Generate a sample instance from an XSD.
    Generate {
        #[structopt(parse(from_os_str))]
        schema: PathBuf,
        /// Root element local name; defaults to the first global element.
        #[structopt(long)]
        root: Option<String>,
        #[structopt(long, default_value = "1")]
        min_elements: u32,
        #[structopt(long, default_value = "3")]
        max_elements: u32,
        /// always | never | random
        #[structopt(long, default_value = "never")]
        emit_optional: String,
        #[structopt(long)]
        seed: Option<u64>,
        #[structopt(long, default_value = "2")]
        indent: usize,
    },
    /// Create an enveloped XML signature.
    Sign {
        #[structopt(parse(from_os_str))]
        xml: PathBuf,
        #[structopt(parse(from_os_str))]
        keystore: PathBuf,
        #[structopt(long, default_value = "")]
        alias: String,
        #[structopt(long, default_value = "")]
        store_password: String,
        #[structopt(long, default_value = "")]
        key_password: String,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Verify an enveloped XML signature.
    Verify {
        #[structopt(parse(from_os_str))]
        xml: PathBuf,
        /// Trusted certificate overriding the embedded one.
        #[structopt(long, parse(from_os_str))]
        cert: Option<PathBuf>,
    },
    /// Generate an RSA key and self-signed certificate.
    Keygen {
        common_name: String,
        #[structopt(long, default_value = "changeit")]
        password: String,
        #[structopt(long, default_value = "2048")]
        bits: usize,
        #[structopt(long, default_value = "365")]
        days: u64,
        #[structopt(long, parse(from_os_str), default_value = "key.pem")]
        out_key: PathBuf,
        #[structopt(long, parse(from_os_str), default_value = "cert.pem")]
        out_cert: PathBuf,
    },
    /// JSON engine commands.
    Json(JsonCli),
}

#[derive(Debug, StructOpt)]
enum JsonCli {
    /// Pretty-print or minify (indent 0) JSON/JSONC/JSON5.
    Format {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        #[structopt(long, default_value = "2")]
        indent: usize,
    },
    /// Well-formedness or JSON Schema validation.
    Validate {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        #[structopt(long, parse(from_os_str))]
        schema: Option<PathBuf>,
    },
    /// Evaluate a JSONPath query.
    Path {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        query: String,
    },
}

fn main() {
    env_logger::init();
    match Cli::from_args() {
        Cli::Validate { schema, xml } => validate(schema, xml),
        Cli::Schematron { rules, xml } => schematron(rules, xml),
        Cli::Generate {
            schema,
            root,
            min_elements,
            max_elements,
            emit_optional,
            seed,
            indent,
        } => generate(schema, root, min_elements, max_elements, &emit_optional, seed, indent),
        Cli::Sign {
            xml,
            keystore,
            alias,
            store_password,
            key_password,
            output,
        } => sign(xml, keystore, alias, store_password, key_password, output),
        Cli::Verify { xml, cert } => verify(xml, cert),
        Cli::Keygen {
            common_name,
            password,
            bits,
            days,
            out_key,
            out_cert,
        } => keygen(common_name, password, bits, days, out_key, out_cert),
        Cli::Json(cmd) => json(cmd),
    }
}

fn validate(schema: Option<PathBuf>, xmls: Vec<PathBuf>) {
    let mut failures = 0usize;
    for xml in &xmls {
        match xmlkit_validator::discovery::validate_file(xml, schema.as_deref()) {
            Ok(errors) => {
                for error in &errors {
                    eprintln!("{error}");
                }
                if !errors.is_empty() {
                    failures += 1;
                } else {
                    eprintln!("{}: valid", xml.display());
                }
            }
            Err(err) => {
                eprintln!("{}: {err}", xml.display());
                exit(1);
            }
        }
    }
    if failures > 0 {
        exit(2);
    }
}

fn schematron(rules: PathBuf, xmls: Vec<PathBuf>) {
    let engine = xmlkit_schematron::SchematronEngine::new();
    let mut failures = 0usize;
    for xml in &xmls {
        let text = match fs::read_to_string(xml) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{}: {err}", xml.display());
                exit(1);
            }
        };
        match engine.validate_file(&rules, &text) {
            Ok(report) => {
                for error in &report.errors {
                    eprintln!("{error}");
                }
                if report.is_valid() {
                    eprintln!("{}: valid ({} rules fired)", xml.display(), report.fired_rules);
                } else {
                    failures += 1;
                }
            }
            Err(err) => {
                eprintln!("{}: {err}", xml.display());
                exit(1);
            }
        }
    }
    if failures > 0 {
        exit(2);
    }
}

#[allow(clippy::too_many_arguments)]
fn generate(
    schema: PathBuf,
    root: Option<String>,
    min_elements: u32,
    max_elements: u32,
    emit_optional: &str,
    seed: Option<u64>,
    indent: usize,
) {
    let mut loader = Loader::fs();
    let doc = match loader.load(&schema) {
        Ok(doc) => doc,
        Err(err) => {
            loader.dump_diagnostic(&err);
            exit(1);
        }
    };
    let registry = match TypeRegistry::from_document(&doc) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("{}: {err}", schema.display());
            exit(1);
        }
    };
    let build = match &root {
        Some(root) => GraphBuilder::new(&registry).build_from(root),
        None => GraphBuilder::new(&registry).build(),
    };
    let graph = match build {
        Ok(graph) => graph,
        Err(err) => {
            eprintln!("{}: {err}", schema.display());
            exit(1);
        }
    };
    for warning in &graph.warnings {
        eprintln!("{warning}");
    }
    let Some(&root_id) = graph.roots.first() else {
        eprintln!("{}: schema declares no global elements", schema.display());
        exit(1);
    };
    let policy = GeneratorPolicy {
        min_elements,
        max_elements,
        emit_optional: match emit_optional {
            "always" => EmitOptional::Always,
            "random" => EmitOptional::Random,
            _ => EmitOptional::Never,
        },
        seed,
        indent,
    };
    match SampleGenerator::with_policy(&graph, &registry, policy).generate(root_id) {
        Ok(instance) => {
            for warning in &instance.warnings {
                eprintln!("{warning}");
            }
            print!("{}", instance.xml);
        }
        Err(err) => {
            eprintln!("{}: {err}", schema.display());
            exit(1);
        }
    }
}

fn sign(
    xml: PathBuf,
    keystore: PathBuf,
    alias: String,
    store_password: String,
    key_password: String,
    output: PathBuf,
) {
    if let Err(err) = xmlkit_signature::sign_file(
        &xml,
        &keystore,
        &store_password,
        &alias,
        &key_password,
        &output,
    ) {
        eprintln!("{}: {err}", xml.display());
        exit(1);
    }
    eprintln!("wrote {}", output.display());
}

fn verify(xml: PathBuf, cert: Option<PathBuf>) {
    match xmlkit_signature::verify_file(&xml, cert.as_deref()) {
        Ok(outcome) if outcome.valid => eprintln!("{}: signature valid", xml.display()),
        Ok(outcome) => {
            eprintln!("{}: signature INVALID ({:?})", xml.display(), outcome.reason);
            exit(2);
        }
        Err(err) => {
            eprintln!("{}: {err}", xml.display());
            exit(1);
        }
    }
}

fn keygen(
    common_name: String,
    password: String,
    bits: usize,
    days: u64,
    out_key: PathBuf,
    out_cert: PathBuf,
) {
    match xmlkit_signature::generate(&common_name, &password, bits, days) {
        Ok(keys) => {
            if let Err(err) = fs::write(&out_key, keys.private_key_pem) {
                eprintln!("{}: {err}", out_key.display());
                exit(1);
            }
            if let Err(err) = fs::write(&out_cert, keys.certificate_pem) {
                eprintln!("{}: {err}", out_cert.display());
                exit(1);
            }
            eprintln!("wrote {} and {}", out_key.display(), out_cert.display());
        }
        Err(err) => {
            eprintln!("keygen: {err}");
            exit(1);
        }
    }
}

fn json(cmd: JsonCli) {
    match cmd {
        JsonCli::Format { file, indent } => {
            let text = read_or_exit(&file);
            match xmlkit_json::format(&text, indent) {
                Ok(formatted) => println!("{formatted}"),
                Err(err) => {
                    eprintln!("{}: {err}", file.display());
                    exit(2);
                }
            }
        }
        JsonCli::Validate { file, schema } => {
            let text = read_or_exit(&file);
            match schema {
                None => {
                    let findings = xmlkit_json::validate_wellformed(&text);
                    for finding in &findings {
                        eprintln!("{}: {finding}", file.display());
                    }
                    if !findings.is_empty() {
                        exit(2);
                    }
                    eprintln!("{}: well-formed", file.display());
                }
                Some(schema_path) => {
                    let schema_text = read_or_exit(&schema_path);
                    match xmlkit_json::validate_against_schema(&text, &schema_text) {
                        Ok(findings) => {
                            for finding in &findings {
                                eprintln!("{}: {finding}", file.display());
                            }
                            if !findings.is_empty() {
                                exit(2);
                            }
                            eprintln!("{}: valid", file.display());
                        }
                        Err(err) => {
                            eprintln!("{}: {err}", schema_path.display());
                            exit(1);
                        }
                    }
                }
            }
        }
        JsonCli::Path { file, query } => {
            let text = read_or_exit(&file);
            match xmlkit_json::execute_jsonpath(&text, &query) {
                Ok(result) => println!("{result}"),
                Err(err) => {
                    eprintln!("{}: {err}", file.display());
                    exit(2);
                }
            }
        }
    }
}

fn read_or_exit(path: &PathBuf) -> String {
    match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("{}: {err}", path.display());
            exit(1);
        }
    }
}
