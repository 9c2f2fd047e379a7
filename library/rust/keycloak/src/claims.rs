//! ベアラートークンのクレームデコーダー。
//!
//! Keycloak が発行した JWT のペイロードを読み取り、[`UserIdentity`] に変換する。
//! 署名・オーディエンス・有効期限の検証は行わない。検証が必要な呼び出し元は、
//! 発行者の JWKS で署名検証を行った後にこのデコーダーを使用すること。

use crate::error::KeycloakError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// base64url（パディング有無どちらも許容）のデコードエンジン。
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// UserIdentity はリクエスト元ユーザーのアイデンティティを表す。
///
/// 任意クレームが欠けている場合は `None`（ロールは空集合）になる。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    /// ユーザー名（`preferred_username`）
    pub username: Option<String>,

    /// ユーザー識別子（`sid`）
    pub user_id: Option<String>,

    /// テナント識別子（`tenantId`）
    pub tenant_id: Option<String>,

    /// メールアドレス（`email`）
    pub email: Option<String>,

    /// メールアドレス確認済みフラグ（`email_verified`）
    pub email_verified: bool,

    /// 名（`given_name`）
    pub first_name: Option<String>,

    /// 姓（`family_name`）
    pub last_name: Option<String>,

    /// 発行元 Realm（`iss` の末尾セグメント、または `realm`）
    pub realm: Option<String>,

    /// Authorized party（`azp`）
    pub client_id: Option<String>,

    /// realm_access と全クライアントの resource_access を合わせたロール集合
    pub roles: BTreeSet<String>,
}

impl UserIdentity {
    /// 指定ロールを保持しているかを返す。
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// いずれかのロールを保持しているかを返す。
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.roles.contains(*r))
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UserIdentity{{username={:?}, user_id={:?}, tenant_id={:?}, realm={:?}, roles={:?}}}",
            self.username, self.user_id, self.tenant_id, self.realm, self.roles,
        )
    }
}

/// DecodedIdentity はデコード結果と、欠けていた認識対象クレームの一覧を保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIdentity {
    pub identity: UserIdentity,
    pub missing_claims: Vec<&'static str>,
}

/// マッピング先のフィールド。
#[derive(Debug, Clone, Copy)]
enum Field {
    Username,
    UserId,
    TenantId,
    Email,
    FirstName,
    LastName,
    Realm,
    ClientId,
    Roles,
    EmailVerified,
}

/// クレーム → フィールドの対応表。クレーム名は大文字小文字を区別する。
///
/// 複数のクレームを持つ行は、いずれも存在しない場合に限り先頭のクレーム名で欠落を報告する。
const CLAIM_TABLE: &[(Field, &[&str])] = &[
    (Field::Username, &["preferred_username"]),
    (Field::UserId, &["sid"]),
    (Field::TenantId, &["tenantId"]),
    (Field::Email, &["email"]),
    (Field::FirstName, &["given_name"]),
    (Field::LastName, &["family_name"]),
    (Field::Realm, &["iss", "realm"]),
    (Field::ClientId, &["azp"]),
    (Field::Roles, &["realm_access", "resource_access"]),
    (Field::EmailVerified, &["email_verified"]),
];

/// ベアラートークンを UserIdentity にデコードする。
///
/// `"Bearer "` プレフィックスの有無はどちらも受け付ける。
/// 構造が不正な場合のみ `TokenMalformed` を返し、任意クレームの欠落は警告ログに留める。
pub fn decode(token: &str) -> Result<UserIdentity, KeycloakError> {
    decode_with_report(token).map(|decoded| decoded.identity)
}

/// decode と同様にデコードし、欠けていたクレーム名の一覧も返す。
pub fn decode_with_report(token: &str) -> Result<DecodedIdentity, KeycloakError> {
    let claims = payload_claims(token)?;

    let mut identity = UserIdentity::default();
    let mut missing_claims = Vec::new();

    for (field, claim_names) in CLAIM_TABLE {
        if !apply_claim(*field, claim_names, &claims, &mut identity) {
            let claim = claim_names[0];
            let present = claim_names.iter().find(|name| claims.contains_key(**name));
            match present {
                // クレームは存在するが値から導出できなかった（例: 空の iss）
                Some(source) => warn!(
                    claim = claim,
                    source = *source,
                    "クレームは存在しますが値を導出できませんでした"
                ),
                None => warn!(claim = claim, "認識対象のクレームがトークンに含まれていません"),
            }
            missing_claims.push(claim);
        }
    }

    Ok(DecodedIdentity {
        identity,
        missing_claims,
    })
}

/// フィールドに対応するクレームを読み取り、値を設定できた場合に `true` を返す。
fn apply_claim(
    field: Field,
    names: &[&str],
    claims: &Map<String, Value>,
    identity: &mut UserIdentity,
) -> bool {
    let slot = match field {
        Field::Username => &mut identity.username,
        Field::UserId => &mut identity.user_id,
        Field::TenantId => &mut identity.tenant_id,
        Field::Email => &mut identity.email,
        Field::FirstName => &mut identity.first_name,
        Field::LastName => &mut identity.last_name,
        Field::ClientId => &mut identity.client_id,
        Field::Realm => {
            identity.realm = realm_from(claims);
            return identity.realm.is_some();
        }
        Field::Roles => return collect_roles(claims, &mut identity.roles),
        Field::EmailVerified => {
            return match names.iter().find_map(|name| claims.get(*name).and_then(as_bool)) {
                Some(verified) => {
                    identity.email_verified = verified;
                    true
                }
                None => false,
            };
        }
    };

    *slot = names
        .iter()
        .find_map(|name| claims.get(*name).and_then(as_string));
    slot.is_some()
}

/// `iss` の末尾パスセグメント、なければ `realm` クレームを Realm 名として返す。
fn realm_from(claims: &Map<String, Value>) -> Option<String> {
    claims
        .get("iss")
        .and_then(Value::as_str)
        .and_then(|iss| iss.trim_end_matches('/').rsplit('/').next())
        .filter(|segment| !segment.is_empty() && !segment.ends_with(':'))
        .map(str::to_string)
        .or_else(|| claims.get("realm").and_then(as_string))
}

/// realm_access.roles と resource_access.*.roles を集約する。どちらのクレームも無ければ `false`。
fn collect_roles(claims: &Map<String, Value>, roles: &mut BTreeSet<String>) -> bool {
    let realm_access = claims.get("realm_access");
    let resource_access = claims.get("resource_access");

    if let Some(access) = realm_access {
        extend_roles(access, roles);
    }
    if let Some(Value::Object(clients)) = resource_access {
        for access in clients.values() {
            extend_roles(access, roles);
        }
    }

    realm_access.is_some() || resource_access.is_some()
}

fn extend_roles(access: &Value, roles: &mut BTreeSet<String>) {
    if let Some(Value::Array(values)) = access.get("roles") {
        roles.extend(values.iter().filter_map(Value::as_str).map(str::to_string));
    }
}

/// 文字列または数値のクレームを文字列として返す。
fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// トークン文字列からペイロードのクレームオブジェクトを取り出す。
fn payload_claims(token: &str) -> Result<Map<String, Value>, KeycloakError> {
    let raw = strip_bearer(token);
    if raw.is_empty() {
        return Err(KeycloakError::TokenMalformed("トークンが空です".to_string()));
    }

    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() != 3 {
        return Err(KeycloakError::TokenMalformed(format!(
            "トークンは 3 つのセグメントで構成される必要があります（実際: {}）",
            segments.len()
        )));
    }

    let payload = segments[1];
    if payload.is_empty() {
        return Err(KeycloakError::TokenMalformed("ペイロードが空です".to_string()));
    }

    let bytes = PAYLOAD_ENGINE.decode(payload).map_err(|e| {
        KeycloakError::TokenMalformed(format!("ペイロードの base64url デコードに失敗しました: {e}"))
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(KeycloakError::TokenMalformed(
            "ペイロードが JSON オブジェクトではありません".to_string(),
        )),
        Err(e) => Err(KeycloakError::TokenMalformed(format!(
            "ペイロードの JSON 解析に失敗しました: {e}"
        ))),
    }
}

/// 前後の空白と `Bearer ` プレフィックス（大文字小文字を区別しない）を取り除く。
fn strip_bearer(token: &str) -> &str {
    let trimmed = token.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
        _ => trimmed,
    }
}
