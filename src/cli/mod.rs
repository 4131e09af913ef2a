//! CLI 모듈
//!
//! docqa-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{CollectedFile, CollectorConfig, FileCollector, FileType};
use crate::config::{has_api_key, CorpusMode, EmbedderKind, RagConfig};
use crate::eval::{builtin_questions, load_questions, EvalConfig};
use crate::qa::QaEngine;

const API_KEY_HELP: &str = "API 키가 설정되지 않았습니다.\n\n\
     설정 방법:\n  \
     export GEMINI_API_KEY=your-api-key\n  \
     또는\n  \
     export GOOGLE_AI_API_KEY=your-api-key\n\n\
     API 키 발급: https://aistudio.google.com/app/apikey\n\
     (오프라인 임베딩: export DOCQA_EMBEDDER=hashing)";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa-rag")]
#[command(version, about = "PDF 문서 질의응답 RAG 엔진", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// PDF(또는 텍스트) 파일이나 폴더를 수집
    Ingest {
        /// 수집할 파일 경로
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 문서 이름 (기본: 파일명)
        #[arg(short, long)]
        name: Option<String>,

        /// PDF만 수집
        #[arg(long)]
        pdf_only: bool,

        /// 수집 전에 기존 코퍼스 삭제 (multi 모드용)
        #[arg(long)]
        reset: bool,
    },

    /// 문서에 질문
    Ask {
        /// 질문
        question: String,

        /// 검색할 청크 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 검색된 청크 표시
        #[arg(long)]
        debug: bool,

        /// JSON 출력
        #[arg(long)]
        json: bool,
    },

    /// 평가 질문 세트로 자동 평가
    Evaluate {
        /// 질문 JSON 파일 (기본: 내장 50문항)
        #[arg(short, long)]
        questions: Option<PathBuf>,

        /// 보고서 경로 (같은 이름의 .json도 저장)
        #[arg(short, long, default_value = "evaluation_report.txt")]
        output: PathBuf,

        /// 질문당 검색할 청크 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 동시에 평가할 질문 수
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// 상태 확인
    Status,

    /// 코퍼스 전체 삭제
    Clear,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest {
            file,
            dir,
            name,
            pdf_only,
            reset,
        } => cmd_ingest(config, file, dir, name, pdf_only, reset).await,
        Commands::Ask {
            question,
            top_k,
            debug,
            json,
        } => cmd_ask(config, &question, top_k, debug, json).await,
        Commands::Evaluate {
            questions,
            output,
            top_k,
            concurrency,
        } => cmd_evaluate(config, questions, &output, top_k, concurrency).await,
        Commands::Status => cmd_status(config).await,
        Commands::Clear => cmd_clear(config).await,
    }
}

/// 영속 저장소로 엔진 열기
async fn open_engine(config: RagConfig) -> Result<QaEngine> {
    if config.embedder == EmbedderKind::Gemini && !has_api_key() {
        bail!(API_KEY_HELP);
    }
    QaEngine::open(config).await.context("QaEngine 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
///
/// single 모드: 단일 파일은 코퍼스를 교체, 폴더는 코퍼스를 새로 구축합니다.
/// multi 모드: 기존 코퍼스에 추가합니다.
async fn cmd_ingest(
    config: RagConfig,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    name: Option<String>,
    pdf_only: bool,
    reset: bool,
) -> Result<()> {
    let collector = FileCollector::new(CollectorConfig {
        pdf_only,
        ..Default::default()
    });

    let files = if let Some(ref file_path) = file {
        match collector.collect_file(file_path)? {
            Some(f) => vec![f],
            None => {
                println!("[!] 지원하지 않는 파일 형식: {:?}", file_path);
                return Ok(());
            }
        }
    } else if let Some(ref dir_path) = dir {
        collector.collect_directory(dir_path)?
    } else {
        bail!("--file 또는 --dir를 지정해야 합니다");
    };

    if files.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    let total_size: u64 = files.iter().map(|f| f.size).sum();
    println!("[*] 수집 대상: {} 파일 ({})", files.len(), format_bytes(total_size as usize));

    let mode = config.corpus_mode;
    let engine = open_engine(config).await?;

    // 단일 파일 + single 모드는 ingest가 교체를 처리
    let replace_single = mode == CorpusMode::Single && files.len() == 1 && !reset;
    if !replace_single && (reset || mode == CorpusMode::Single) {
        println!("[*] 기존 코퍼스 삭제 중...");
        engine.clear().await.context("코퍼스 삭제 실패")?;
    }

    let mut success_count = 0;
    let mut error_count = 0;

    for (i, collected) in files.iter().enumerate() {
        let document_name = match (&name, files.len()) {
            (Some(n), 1) => n.clone(),
            _ => collected.document_name(),
        };

        print!(
            "[{}/{}] [{}] {}... ",
            i + 1,
            files.len(),
            type_label(collected),
            display_name(&collected.path)
        );

        let result = if replace_single {
            engine.ingest(&document_name, &collected.path).await
        } else {
            engine.add_document(&document_name, &collected.path).await
        };

        match result {
            Ok(summary) => {
                println!("완료 ({} 청크)", summary.chunks_added);
                success_count += 1;
            }
            Err(e) => {
                println!("실패: {}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!(
        "[OK] 완료: 성공 {}, 실패 {} (전체 {} 청크)",
        success_count,
        error_count,
        engine.health().chunk_count
    );

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: RagConfig,
    question: &str,
    top_k: Option<usize>,
    debug: bool,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    if !engine.has_generator() {
        bail!(API_KEY_HELP);
    }

    let answer = match engine.ask(question, top_k, debug).await {
        Ok(answer) => answer,
        Err(e) if json => {
            println!("{}", serde_json::to_string_pretty(&e.to_body())?);
            return Err(e.into());
        }
        Err(e) => return Err(e).context("질문 처리 실패"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("[*] 질문: {}", question.trim());
    println!();
    println!("[OK] 답변:");
    println!("   {}", answer.answer);
    println!();
    if !answer.citations.is_empty() {
        println!("   출처: {}", answer.citations);
    }

    if let Some(hits) = answer.debug {
        println!();
        println!("[*] 검색된 청크 ({} 건):", hits.len());
        for hit in hits {
            println!("  {}. [{} p.{}]", hit.rank, hit.document, hit.page);
            println!("     {}", truncate_text(&hit.snippet, 120));
        }
    }

    Ok(())
}

/// 평가 명령어 (evaluate)
async fn cmd_evaluate(
    config: RagConfig,
    questions_path: Option<PathBuf>,
    output: &Path,
    top_k: Option<usize>,
    concurrency: Option<usize>,
) -> Result<()> {
    let questions = match questions_path {
        Some(ref path) => load_questions(path).context("질문 파일 로드 실패")?,
        None => builtin_questions(),
    };

    let mut eval_config = EvalConfig::from(&config);
    if let Some(k) = top_k {
        eval_config.top_k = k;
    }
    if let Some(c) = concurrency {
        eval_config.concurrency = c.max(1);
    }

    let engine = open_engine(config).await?;
    if !engine.has_generator() {
        bail!(API_KEY_HELP);
    }

    let health = engine.health();
    if !health.documents_indexed {
        bail!("수집된 문서가 없습니다. 먼저 ingest 명령으로 문서를 추가하세요.");
    }

    println!(
        "[*] 평가 시작: {} 문항 (청크 {} 개, top_k={}, 동시 {} 개)",
        questions.len(),
        health.chunk_count,
        eval_config.top_k,
        eval_config.concurrency
    );

    let run = engine
        .evaluate_with(&questions, &eval_config)
        .await
        .context("평가 실패")?;

    println!();
    println!("{}", run.report.to_text());
    println!();

    let (text_path, json_path) = run.save(output).context("보고서 저장 실패")?;
    println!("[OK] 보고서 저장: {}", text_path.display());
    println!("[OK] 상세 결과 저장: {}", json_path.display());

    let failed = run.records.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        println!("[!] 생성 실패 {} 문항 (보고서에 실패로 기록됨)", failed);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: RagConfig) -> Result<()> {
    println!("docqa-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 코퍼스 모드: {:?}, 청크 {} 토큰 / 오버랩 {} 토큰, top_k {}",
        config.corpus_mode, config.chunk_size, config.chunk_overlap, config.top_k
    );

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    if config.embedder == EmbedderKind::Gemini && !has_api_key() {
        return Ok(());
    }

    match QaEngine::open(config).await {
        Ok(engine) => {
            let stats = engine.store().stats();
            println!(
                "[OK] 인덱싱된 문서: {} 건, {} 청크 (임베딩: {})",
                stats.document_count, stats.chunk_count, stats.embedder
            );
            for name in engine.store().document_names() {
                println!("     - {}", name);
            }

            match engine.store().catalog_stats() {
                Ok(Some(catalog)) => {
                    let size = std::fs::metadata(&catalog.db_path)
                        .map(|m| m.len() as usize)
                        .unwrap_or(0);
                    println!(
                        "[*] 카탈로그: {} ({}, {} 청크 / {} 문서)",
                        catalog.db_path.display(),
                        format_bytes(size),
                        catalog.chunk_count,
                        catalog.document_count
                    );
                    if catalog.chunk_count != stats.chunk_count {
                        println!("[!] 카탈로그와 메모리 청크 수가 다릅니다. 다시 수집하세요.");
                    }
                }
                Ok(None) => {}
                Err(e) => println!("[!] 카탈로그 조회 실패: {}", e),
            }
        }
        Err(e) => {
            println!("[!] 저장소 열기 실패: {}", e);
        }
    }

    Ok(())
}

/// 삭제 명령어 (clear)
async fn cmd_clear(config: RagConfig) -> Result<()> {
    let engine = open_engine(config).await?;
    let before = engine.health().chunk_count;
    engine.clear().await.context("코퍼스 삭제 실패")?;
    println!("[OK] 코퍼스 삭제됨 ({} 청크)", before);
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn type_label(file: &CollectedFile) -> &'static str {
    match file.file_type {
        FileType::Pdf => "PDF",
        FileType::Text => "TXT",
    }
}

fn display_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("fuel", 10), "fuel");
        assert_eq!(truncate_text("fuel reserve", 4), "fuel...");
        assert_eq!(truncate_text("fuel\nreserve", 20), "fuel reserve");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "연료 예비량 계산";
        assert_eq!(truncate_text(korean, 2), "연료...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_cli_parses_ask() {
        let cli = Cli::parse_from(["docqa-rag", "ask", "What is ICAO?", "-k", "5", "--debug"]);
        match cli.command {
            Commands::Ask {
                question,
                top_k,
                debug,
                json,
            } => {
                assert_eq!(question, "What is ICAO?");
                assert_eq!(top_k, Some(5));
                assert!(debug);
                assert!(!json);
            }
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn test_cli_evaluate_defaults() {
        let cli = Cli::parse_from(["docqa-rag", "evaluate"]);
        match cli.command {
            Commands::Evaluate {
                questions, output, ..
            } => {
                assert!(questions.is_none());
                assert_eq!(output, PathBuf::from("evaluation_report.txt"));
            }
            _ => panic!("expected evaluate command"),
        }
    }
}
