use crate::adaptive::models::elo::EloRating;
use crate::store::operations::questions::Question;
use crate::store::{keys, Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_question_index_backfill", m002_question_index_backfill),
    ]
}

/// 执行所有未应用的数据库迁移。
///
/// - 每个迁移必须幂等：进程可能在迁移完成后、写入版本号前中断，重启时会重跑。
/// - 版本号在每个迁移成功后立即持久化。
/// - 仅向前，set_version 拒绝降级。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.config_versions.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt version marker ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .config_versions
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// 为直接写入 questions 树的题目补齐学科索引和初始难度评分
fn m002_question_index_backfill(store: &Store) -> Result<(), StoreError> {
    let mut backfilled = 0usize;
    for item in store.questions.iter() {
        let (_, value) = item?;
        let question: Question = Store::deserialize(&value)?;

        let index_key = keys::question_subject_index_key(
            &question.subject,
            question.difficulty.level(),
            &question.id,
        )?;
        store
            .questions_by_subject
            .insert(index_key.as_bytes(), question.id.as_bytes())?;

        let rating_key = keys::question_rating_key(&question.id)?;
        let seed = Store::serialize(&EloRating::new(question.parameters.elo_rating))?;
        let seeded = store
            .question_ratings
            .compare_and_swap(rating_key.as_bytes(), None::<&[u8]>, Some(seed))?;
        if seeded.is_ok() {
            backfilled += 1;
        }
    }
    if backfilled > 0 {
        tracing::info!(backfilled, "Seeded missing question ratings");
    }
    Ok(())
}
