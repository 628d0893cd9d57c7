//! Syscall name table
//!
//! Maps the `package.Method` names used in assembly source to the interop
//! api names the VM resolves at runtime.

/// (package, method, api)
const SYSCALLS: &[(&str, &str, &str)] = &[
    ("storage", "GetContext", "System.Storage.GetContext"),
    ("storage", "Put", "System.Storage.Put"),
    ("storage", "Get", "System.Storage.Get"),
    ("storage", "Delete", "System.Storage.Delete"),
    ("storage", "Find", "System.Storage.Find"),
    ("runtime", "GetTrigger", "System.Runtime.GetTrigger"),
    ("runtime", "CheckWitness", "System.Runtime.CheckWitness"),
    ("runtime", "Notify", "Neo.Runtime.Notify"),
    ("runtime", "Log", "System.Runtime.Log"),
    ("runtime", "GetTime", "System.Runtime.GetTime"),
    ("runtime", "Serialize", "System.Runtime.Serialize"),
    ("runtime", "Deserialize", "System.Runtime.Deserialize"),
    ("blockchain", "GetHeight", "System.Blockchain.GetHeight"),
    ("blockchain", "GetHeader", "System.Blockchain.GetHeader"),
    ("blockchain", "GetBlock", "System.Blockchain.GetBlock"),
    ("blockchain", "GetTransaction", "System.Blockchain.GetTransaction"),
    ("blockchain", "GetContract", "System.Blockchain.GetContract"),
    ("blockchain", "GetAccount", "Neo.Blockchain.GetAccount"),
    ("blockchain", "GetValidators", "Neo.Blockchain.GetValidators"),
    ("blockchain", "GetAsset", "Neo.Blockchain.GetAsset"),
    ("header", "GetIndex", "System.Header.GetIndex"),
    ("header", "GetHash", "System.Header.GetHash"),
    ("header", "GetPrevHash", "System.Header.GetPrevHash"),
    ("header", "GetTimestamp", "System.Header.GetTimestamp"),
    ("header", "GetVersion", "Neo.Header.GetVersion"),
    ("header", "GetMerkleRoot", "Neo.Header.GetMerkleRoot"),
    ("header", "GetConsensusData", "Neo.Header.GetConsensusData"),
    ("header", "GetNextConsensus", "Neo.Header.GetNextConsensus"),
    ("block", "GetTransactionCount", "System.Block.GetTransactionCount"),
    ("block", "GetTransactions", "System.Block.GetTransactions"),
    ("block", "GetTransaction", "System.Block.GetTransaction"),
    ("transaction", "GetType", "Neo.Transaction.GetType"),
    ("transaction", "GetAttributes", "Neo.Transaction.GetAttributes"),
    ("transaction", "GetInputs", "Neo.Transaction.GetInputs"),
    ("transaction", "GetOutputs", "Neo.Transaction.GetOutputs"),
    ("transaction", "GetReferences", "Neo.Transaction.GetReferences"),
    ("transaction", "GetUnspentCoins", "Neo.Transaction.GetUnspentCoins"),
    ("transaction", "GetScript", "Neo.Transaction.GetScript"),
    ("asset", "GetAssetID", "Neo.Asset.GetAssetID"),
    ("asset", "GetAssetType", "Neo.Asset.GetAssetType"),
    ("asset", "GetAmount", "Neo.Asset.GetAmount"),
    ("asset", "Create", "Neo.Asset.Create"),
    ("asset", "Renew", "Neo.Asset.Renew"),
    ("contract", "GetScript", "Neo.Contract.GetScript"),
    ("contract", "IsPayable", "Neo.Contract.IsPayable"),
    ("contract", "Create", "Neo.Contract.Create"),
    ("contract", "Destroy", "Neo.Contract.Destroy"),
    ("contract", "Migrate", "Neo.Contract.Migrate"),
    ("contract", "GetStorageContext", "Neo.Contract.GetStorageContext"),
    ("input", "GetHash", "Neo.Input.GetHash"),
    ("input", "GetIndex", "Neo.Input.GetIndex"),
    ("output", "GetAssetID", "Neo.Output.GetAssetID"),
    ("output", "GetValue", "Neo.Output.GetValue"),
    ("output", "GetScriptHash", "Neo.Output.GetScriptHash"),
    ("engine", "GetScriptContainer", "System.ExecutionEngine.GetScriptContainer"),
    ("engine", "GetCallingScriptHash", "System.ExecutionEngine.GetCallingScriptHash"),
    ("engine", "GetEntryScriptHash", "System.ExecutionEngine.GetEntryScriptHash"),
    ("engine", "GetExecutingScriptHash", "System.ExecutionEngine.GetExecutingScriptHash"),
    ("iterator", "Create", "Neo.Iterator.Create"),
    ("iterator", "Key", "Neo.Iterator.Key"),
    ("iterator", "Keys", "Neo.Iterator.Keys"),
    ("iterator", "Values", "Neo.Iterator.Values"),
];

/// Api name for `package.method`
pub fn lookup(package: &str, method: &str) -> Option<&'static str> {
    SYSCALLS
        .iter()
        .find(|(p, m, _)| *p == package && *m == method)
        .map(|(_, _, api)| *api)
}

/// Resolve either a `package.Method` short name or a full api name
pub fn resolve(name: &str) -> Option<&'static str> {
    if let Some(api) = SYSCALLS.iter().map(|(_, _, api)| *api).find(|api| *api == name) {
        return Some(api);
    }
    let (package, method) = name.split_once('.')?;
    lookup(package, method)
}
